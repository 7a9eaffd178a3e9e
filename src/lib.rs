//! # IV DAQ Core Library
//!
//! Current–voltage characterisation of two-terminal components on a serial bench
//! instrument. The library holds everything the `iv-daq` binary drives, so tests
//! and other frontends can run the same pipeline against a simulated instrument.
//!
//! ## Crate Structure
//!
//! - **`config`**: layered `AppConfig` (TOML file plus `IV_DAQ_*` environment).
//! - **`component`**: the named device under test.
//! - **`data`**: sample-file format, directory layout, statistics and the
//!   cross-repeat `AggregationEngine`.
//! - **`error`**: the `DaqError` taxonomy shared by every module.
//! - **`experiment`**: run plan, operator swap checkpoint and the `Orchestrator`
//!   state machine.
//! - **`instrument`**: wire protocol, the `InstrumentChannel`, the serial transport
//!   and the simulated firmware.
//! - **`sweep`**: `SweepConfig` and the `SweepExecutor` that writes raw samples.
//! - **`tracing_setup`**: structured logging initialisation.

pub mod component;
pub mod config;
pub mod data;
pub mod error;
pub mod experiment;
pub mod instrument;
pub mod sweep;
pub mod tracing_setup;
