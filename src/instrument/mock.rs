//! Simulated instrument firmware
//!
//! Speaks the bench wire protocol on one end of a `tokio::io::duplex` pipe so the
//! channel, the sweep executor and the orchestrator can run without hardware.
//!
//! # Behaviour
//!
//! - Emits a boot banner (three lines by default) as soon as it is spawned
//! - `<S{v}>` is echoed as `S {v}` and becomes the reported voltage
//! - `<V2>` answers `V {setpoint}`
//! - `<I1>` answers `I {current}` from either a diode model or a scripted sequence
//!
//! Faults can be injected to exercise the error paths: a malformed current reply
//! at a given reading index, or closing the link after a number of replies.

use super::protocol::Command;
use std::collections::VecDeque;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};
use tracing::debug;

/// Source of current readings.
#[derive(Debug, Clone)]
pub enum CurrentModel {
    /// Shockley diode: `I = is * (exp(V / n_vt) - 1)`
    Diode {
        /// Saturation current (A)
        saturation_current: f64,
        /// Ideality factor times thermal voltage (V)
        n_vt: f64,
    },
    /// Fixed sequence, one value per `<I1>`; repeats the last value when exhausted
    Scripted(VecDeque<f64>),
}

impl CurrentModel {
    fn next(&mut self, voltage: f64) -> f64 {
        match self {
            CurrentModel::Diode {
                saturation_current,
                n_vt,
            } => *saturation_current * ((voltage / *n_vt).exp() - 1.0),
            CurrentModel::Scripted(values) => {
                if values.len() > 1 {
                    values.pop_front().unwrap_or_default()
                } else {
                    values.front().copied().unwrap_or_default()
                }
            }
        }
    }
}

/// Builder for a simulated instrument.
///
/// # Example
///
/// ```rust,ignore
/// let stream = MockInstrument::scripted(vec![0.1, 0.2, 0.3]).spawn();
/// let channel = InstrumentChannel::connect(Box::new(stream), ChannelSettings::default()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct MockInstrument {
    banner: Vec<String>,
    model: CurrentModel,
    malformed_current_at: Option<usize>,
    close_after_replies: Option<usize>,
}

impl MockInstrument {
    /// Red-LED-like diode with a 3-line banner.
    pub fn diode() -> Self {
        Self::with_model(CurrentModel::Diode {
            saturation_current: 1e-18,
            n_vt: 0.052,
        })
    }

    /// Replies to `<I1>` with `currents` in order.
    pub fn scripted(currents: Vec<f64>) -> Self {
        Self::with_model(CurrentModel::Scripted(currents.into()))
    }

    fn with_model(model: CurrentModel) -> Self {
        Self {
            banner: vec![
                "IV bench controller".to_string(),
                "firmware 1.0".to_string(),
                "ready".to_string(),
            ],
            model,
            malformed_current_at: None,
            close_after_replies: None,
        }
    }

    /// Replace the boot banner.
    pub fn with_banner<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.banner = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Answer the `index`-th `<I1>` (0-based) with a label and no value.
    pub fn with_malformed_current_at(mut self, index: usize) -> Self {
        self.malformed_current_at = Some(index);
        self
    }

    /// Close the link after `replies` response lines (banner excluded).
    pub fn with_close_after(mut self, replies: usize) -> Self {
        self.close_after_replies = Some(replies);
        self
    }

    /// Start the firmware task and return the host end of the link.
    pub fn spawn(self) -> DuplexStream {
        let (host, device) = tokio::io::duplex(1024);
        tokio::spawn(async move {
            if let Err(e) = self.serve(device).await {
                debug!(error = %e, "Mock instrument stopped");
            }
        });
        host
    }

    async fn serve(mut self, device: DuplexStream) -> std::io::Result<()> {
        let mut device = BufReader::new(device);

        for line in &self.banner {
            device.get_mut().write_all(format!("{}\n", line).as_bytes()).await?;
        }

        let mut setpoint = 0.0_f64;
        let mut current_reads = 0usize;
        let mut replies = 0usize;
        let mut token = Vec::new();

        loop {
            token.clear();
            if device.read_until(b'>', &mut token).await? == 0 {
                return Ok(());
            }
            let text = String::from_utf8_lossy(&token);
            let Some(command) = text.find('<').and_then(|at| Command::parse(&text[at..])) else {
                debug!(token = %text, "Mock instrument ignoring unknown token");
                continue;
            };

            if self.close_after_replies == Some(replies) {
                return Ok(());
            }

            let reply = match command {
                Command::SetVoltage(v) => {
                    setpoint = v;
                    format!("S {}\n", v)
                }
                Command::ReadVoltage => format!("V {}\n", setpoint),
                Command::ReadCurrent => {
                    let index = current_reads;
                    current_reads += 1;
                    let current = self.model.next(setpoint);
                    if self.malformed_current_at == Some(index) {
                        "I\n".to_string()
                    } else {
                        format!("I {}\n", current)
                    }
                }
            };
            device.get_mut().write_all(reply.as_bytes()).await?;
            replies += 1;
        }
    }
}
