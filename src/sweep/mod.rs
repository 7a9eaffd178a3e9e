//! Voltage sweeps: the commanded grid and the executor that walks it.

pub mod executor;
pub mod plan;

pub use executor::{SweepExecutor, SweepSummary};
pub use plan::SweepConfig;
