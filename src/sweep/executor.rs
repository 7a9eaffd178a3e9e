//! Executes one voltage sweep and persists the raw samples.
//!
//! Per point the instrument sees `<S{v}>`, `<I1>`, `<V2>` back to back; the
//! replies are then consumed in the same order: the set-voltage echo is dropped,
//! the current and voltage values become one [`RawSampleRow`].
//!
//! Rows go to `<dest>.partial` and are flushed one by one. Only a sweep that
//! produced every point is renamed to `dest`, so an interrupted repeat can never
//! be picked up by aggregation.

use super::plan::SweepConfig;
use crate::component::ComponentUnderTest;
use crate::data::layout::{ensure_dir, partial_path};
use crate::data::sample_file::{RawSampleRow, SampleWriter, SweepHeader};
use crate::error::{AppResult, DaqError};
use crate::instrument::{Command, InstrumentChannel};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Outcome of a completed sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    /// Final sample file
    pub path: PathBuf,
    /// Rows written (always the configured sample count)
    pub rows: usize,
}

/// Drives the instrument through one [`SweepConfig`].
#[derive(Debug, Clone)]
pub struct SweepExecutor {
    config: SweepConfig,
}

impl SweepExecutor {
    /// Executor for a validated sweep.
    pub fn new(config: SweepConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The sweep this executor runs.
    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Sweep `component` and write its samples to `dest`.
    ///
    /// # Errors
    /// Any failure is returned as [`DaqError::SweepAborted`] carrying the partial
    /// file path and the number of rows that made it to disk. After a malformed
    /// response the channel is drained back into step before returning.
    #[instrument(skip_all, fields(component = %component, dest = %dest.display()))]
    pub async fn execute(
        &self,
        channel: &mut InstrumentChannel,
        component: &ComponentUnderTest,
        dest: &Path,
    ) -> AppResult<SweepSummary> {
        if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
            ensure_dir(dir)?;
        }

        let partial = partial_path(dest);
        let header = SweepHeader::today(component, &self.config);
        let mut writer = SampleWriter::<RawSampleRow>::create(&partial, &header)?;

        info!(
            start = self.config.start_voltage,
            end = self.config.end_voltage,
            samples = self.config.sample_count,
            step = self.config.step(),
            "Sweep started"
        );

        let points = self.config.points();
        let last = points.len().saturating_sub(1);
        for (index, &setpoint) in points.iter().enumerate() {
            let measured = match measure_point(channel, setpoint).await {
                Ok(row) => writer.append(&row).map(|_| row),
                Err(e) if e.is_malformed_response() => match channel.resync().await {
                    Ok(()) => Err(e),
                    Err(resync) => {
                        warn!(malformed = %e, "Link lost while draining after malformed response");
                        Err(resync)
                    }
                },
                Err(e) => Err(e),
            };

            let row = match measured {
                Ok(row) => row,
                Err(source) => {
                    let rows_written = writer.rows();
                    drop(writer);
                    warn!(
                        index,
                        setpoint,
                        rows_written,
                        error = %source,
                        "Sweep aborted"
                    );
                    return Err(DaqError::SweepAborted {
                        component: component.name().to_string(),
                        rows_written,
                        partial_file: partial,
                        source: Box::new(source),
                    });
                }
            };

            debug!(
                index,
                setpoint,
                voltage = row.voltage,
                current = row.current,
                "Sample recorded"
            );

            if index < last && !self.config.inter_sample_delay.is_zero() {
                tokio::time::sleep(self.config.inter_sample_delay).await;
            }
        }

        let rows = writer.finish()?;
        std::fs::rename(&partial, dest).map_err(|e| DaqError::filesystem(dest, e))?;

        info!(rows, "Sweep complete");
        Ok(SweepSummary {
            path: dest.to_path_buf(),
            rows,
        })
    }
}

/// One point: command, read back, record what the instrument reports.
async fn measure_point(channel: &mut InstrumentChannel, setpoint: f64) -> AppResult<RawSampleRow> {
    let set = Command::SetVoltage(setpoint);
    channel.send(set).await?;
    channel.send(Command::ReadCurrent).await?;
    channel.send(Command::ReadVoltage).await?;

    channel.discard_response(set).await?;
    let current = channel.read_value(Command::ReadCurrent).await?;
    let voltage = channel.read_value(Command::ReadVoltage).await?;

    Ok(RawSampleRow { voltage, current })
}
