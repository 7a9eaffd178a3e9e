//! Run state and per-component outcomes.

use std::fmt;
use std::path::PathBuf;

/// Where the orchestrator currently is.
///
/// # State Machine
///
/// ```text
/// Idle ──> AwaitingSwap ──confirm──> Sweeping(0..repeats) ──> Aggregating ─┐
///               ▲                                                          │
///               └──────────────────── next component ──────────────────────┘
///                                                                          │
///                                        Finished <── last component ──────┘
///
/// any state ──transport / filesystem failure──> Aborted
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Not started
    Idle,
    /// Blocked until the operator confirms the component is installed
    AwaitingSwap {
        /// Component to install
        component: String,
    },
    /// Sweep in progress
    Sweeping {
        /// Component being measured
        component: String,
        /// 0-based repeat index
        repeat: usize,
        /// Total repeats for this component
        repeats: usize,
    },
    /// Averaging the component's repeat files
    Aggregating {
        /// Component being aggregated
        component: String,
    },
    /// Every component processed
    Finished,
    /// Stopped by an unrecoverable failure
    Aborted,
}

impl RunState {
    /// True while the run is blocked on the operator.
    pub fn is_awaiting_swap(&self) -> bool {
        matches!(self, RunState::AwaitingSwap { .. })
    }

    /// True once the run can make no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Finished | RunState::Aborted)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => write!(f, "Idle"),
            RunState::AwaitingSwap { component } => write!(f, "Awaiting swap to {}", component),
            RunState::Sweeping {
                component,
                repeat,
                repeats,
            } => write!(f, "Sweeping {} ({}/{})", component, repeat + 1, repeats),
            RunState::Aggregating { component } => write!(f, "Aggregating {}", component),
            RunState::Finished => write!(f, "Finished"),
            RunState::Aborted => write!(f, "Aborted"),
        }
    }
}

/// What happened to one component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentOutcome {
    /// Component name
    pub component: String,
    /// Repeats that produced a complete sample file
    pub completed_repeats: usize,
    /// Aggregated profile, when aggregation ran and succeeded
    pub profile: Option<PathBuf>,
    /// Why the component did not produce a profile
    pub failure: Option<String>,
}

impl ComponentOutcome {
    pub(crate) fn new(component: &str) -> Self {
        Self {
            component: component.to_string(),
            completed_repeats: 0,
            profile: None,
            failure: None,
        }
    }

    /// True when every repeat completed and the profile was written.
    pub fn succeeded(&self) -> bool {
        self.profile.is_some() && self.failure.is_none()
    }
}

/// Summary of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// One entry per component, in run order
    pub outcomes: Vec<ComponentOutcome>,
}

impl RunReport {
    /// True when every component produced a profile.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(ComponentOutcome::succeeded)
    }

    /// Components that did not produce a profile.
    pub fn failures(&self) -> impl Iterator<Item = &ComponentOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }
}
