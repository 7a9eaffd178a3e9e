//! Sample persistence and cross-repeat aggregation.
//!
//! - **`sample_file`**: typed header plus space-separated rows, shared by raw
//!   repeat files and aggregated profiles.
//! - **`layout`**: directory and file naming per component, repeat discovery.
//! - **`statistics`**: mean and population standard deviation.
//! - **`aggregate`**: the `AggregationEngine` that turns repeat files into a profile.

pub mod aggregate;
pub mod layout;
pub mod sample_file;
pub mod statistics;

pub use aggregate::{AggregatedProfile, AggregationEngine};
pub use layout::DataLayout;
pub use sample_file::{AggregatedRow, RawSampleRow, SampleFile, SweepHeader};
