//! Run orchestration: what to measure, the operator checkpoint, and the state
//! machine that ties sweeps and aggregation together.

pub mod confirmation;
pub mod orchestrator;
pub mod plan;
pub mod state;

pub use confirmation::{
    confirmation_channel, AutoConfirm, ChannelConfirmation, StdinConfirmation, SwapConfirmation,
    SwapConfirmer,
};
pub use orchestrator::{collect_single, Orchestrator};
pub use plan::RunPlan;
pub use state::{ComponentOutcome, RunReport, RunState};
