//! Operator checkpoint before each component.
//!
//! The swap itself is manual; the orchestrator only waits for someone to say the
//! component is in place. [`SwapConfirmation`] lets a terminal, a UI or a test
//! harness provide that signal the same way.

use crate::component::ComponentUnderTest;
use crate::error::{AppResult, DaqError};
use async_trait::async_trait;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Source of "component installed" confirmations.
#[async_trait]
pub trait SwapConfirmation: Send {
    /// Block until `component` is confirmed installed. No timeout.
    ///
    /// # Errors
    /// `OperatorAborted` when the confirmation source is gone.
    async fn confirm_installed(&mut self, component: &ComponentUnderTest) -> AppResult<()>;
}

/// Prompts on stdout and waits for Enter on stdin.
pub struct StdinConfirmation {
    stdin: BufReader<Stdin>,
}

impl StdinConfirmation {
    /// Read confirmations from the process's stdin.
    pub fn new() -> Self {
        Self {
            stdin: BufReader::new(tokio::io::stdin()),
        }
    }
}

impl Default for StdinConfirmation {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SwapConfirmation for StdinConfirmation {
    async fn confirm_installed(&mut self, component: &ComponentUnderTest) -> AppResult<()> {
        print!("Press Enter when {} is ready", component);
        std::io::stdout()
            .flush()
            .map_err(|e| DaqError::OperatorAborted(format!("prompt failed: {}", e)))?;

        let mut line = String::new();
        let n = self
            .stdin
            .read_line(&mut line)
            .await
            .map_err(|e| DaqError::OperatorAborted(format!("stdin read failed: {}", e)))?;
        if n == 0 {
            return Err(DaqError::OperatorAborted("stdin closed".to_string()));
        }
        info!(component = %component, "Operator confirmed component installed");
        Ok(())
    }
}

/// Confirms immediately. For unattended runs where nothing is swapped.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoConfirm;

#[async_trait]
impl SwapConfirmation for AutoConfirm {
    async fn confirm_installed(&mut self, component: &ComponentUnderTest) -> AppResult<()> {
        info!(component = %component, "Swap checkpoint auto-confirmed");
        Ok(())
    }
}

/// Receives confirmations sent through a [`SwapConfirmer`].
pub struct ChannelConfirmation {
    rx: mpsc::Receiver<String>,
}

/// Sending half handed to a UI or test harness.
#[derive(Debug, Clone)]
pub struct SwapConfirmer {
    tx: mpsc::Sender<String>,
}

/// Create a connected confirmer / confirmation pair.
pub fn confirmation_channel() -> (SwapConfirmer, ChannelConfirmation) {
    let (tx, rx) = mpsc::channel(8);
    (SwapConfirmer { tx }, ChannelConfirmation { rx })
}

impl SwapConfirmer {
    /// Report that `component` is installed.
    pub async fn confirm(&self, component: &str) -> AppResult<()> {
        self.tx
            .send(component.to_string())
            .await
            .map_err(|_| DaqError::OperatorAborted("orchestrator stopped listening".to_string()))
    }
}

#[async_trait]
impl SwapConfirmation for ChannelConfirmation {
    async fn confirm_installed(&mut self, component: &ComponentUnderTest) -> AppResult<()> {
        loop {
            let Some(confirmed) = self.rx.recv().await else {
                return Err(DaqError::OperatorAborted(
                    "confirmation sender dropped".to_string(),
                ));
            };
            if confirmed == component.name() {
                info!(component = %component, "Component installation confirmed");
                return Ok(());
            }
            warn!(
                expected = %component,
                confirmed = %confirmed,
                "Ignoring confirmation for a different component"
            );
        }
    }
}
