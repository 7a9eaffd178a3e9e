//! Cross-repeat aggregation.
//!
//! Rows are aligned by position: row `i` of every repeat file is the same
//! commanded voltage point. Files with different row counts make the statistics
//! meaningless, so aggregation refuses them and writes nothing.

use super::layout::DataLayout;
use super::sample_file::{AggregatedRow, RawSampleRow, SampleFile, SampleWriter, SweepHeader};
use super::statistics::Summary;
use crate::component::ComponentUnderTest;
use crate::error::{AppResult, DaqError};
use crate::sweep::SweepConfig;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// The aggregated result for one component.
#[derive(Debug, Clone)]
pub struct AggregatedProfile {
    /// Header written at the top of the profile file
    pub header: SweepHeader,
    /// One row per sample position
    pub rows: Vec<AggregatedRow>,
    /// Repeat files that contributed, in aggregation order
    pub sources: Vec<PathBuf>,
    /// Where the profile was written
    pub path: PathBuf,
}

/// Builds per-component profiles from the repeat files on disk.
#[derive(Debug, Clone)]
pub struct AggregationEngine {
    layout: DataLayout,
    sweep: SweepConfig,
}

impl AggregationEngine {
    /// Engine for files under `layout`, described by `sweep` in the profile header.
    pub fn new(layout: DataLayout, sweep: SweepConfig) -> Self {
        Self { layout, sweep }
    }

    /// Recompute the profile of `component` from every completed repeat file.
    ///
    /// The previous profile, if any, is replaced. Nothing is written on error.
    #[instrument(skip_all, fields(component = %component))]
    pub fn aggregate(&self, component: &ComponentUnderTest) -> AppResult<AggregatedProfile> {
        let paths = self.layout.discover_repeats(component)?;
        if paths.is_empty() {
            return Err(DaqError::NoSampleFiles {
                component: component.name().to_string(),
                dir: self.layout.component_dir(component),
            });
        }

        let files = paths
            .iter()
            .map(|p| SampleFile::<RawSampleRow>::read(p))
            .collect::<AppResult<Vec<_>>>()?;
        self.check_headers(component, &files);

        let rows = aggregate_rows(component, &files)?;

        let header = SweepHeader::today(component, &self.sweep);
        let path = self.layout.profile_path(component);
        let mut writer = SampleWriter::<AggregatedRow>::create(&path, &header)?;
        for row in &rows {
            writer.append(row)?;
        }
        writer.finish()?;

        info!(
            files = files.len(),
            rows = rows.len(),
            profile = %path.display(),
            "Aggregated repeats"
        );

        Ok(AggregatedProfile {
            header,
            rows,
            sources: paths,
            path,
        })
    }

    fn check_headers(&self, component: &ComponentUnderTest, files: &[SampleFile<RawSampleRow>]) {
        for file in files {
            let h = &file.header;
            if h.component != component.name()
                || h.start_voltage != self.sweep.start_voltage
                || h.end_voltage != self.sweep.end_voltage
                || file.rows.len() != self.sweep.sample_count
            {
                warn!(
                    file = %file.path.display(),
                    header_component = %h.component,
                    header_range = %format!("{}-{}", h.start_voltage, h.end_voltage),
                    rows = file.rows.len(),
                    "Repeat file does not match the configured sweep"
                );
            }
        }
    }
}

/// Position-wise mean and population standard deviation across `files`.
///
/// # Errors
/// `Alignment` when any file's row count differs from the first file's,
/// `SampleFormat` when the files carry no rows at all.
pub fn aggregate_rows(
    component: &ComponentUnderTest,
    files: &[SampleFile<RawSampleRow>],
) -> AppResult<Vec<AggregatedRow>> {
    let Some(first) = files.first() else {
        return Ok(Vec::new());
    };
    let expected_rows = first.rows.len();
    if let Some(misaligned) = files.iter().find(|f| f.rows.len() != expected_rows) {
        return Err(DaqError::Alignment {
            component: component.name().to_string(),
            expected_rows,
            found_rows: misaligned.rows.len(),
            file: misaligned.path.clone(),
        });
    }

    if expected_rows == 0 {
        return Err(DaqError::SampleFormat {
            path: first.path.clone(),
            reason: "no data rows".to_string(),
        });
    }

    (0..expected_rows)
        .map(|position| {
            let voltages: Vec<f64> = files.iter().map(|f| f.rows[position].voltage).collect();
            let currents: Vec<f64> = files.iter().map(|f| f.rows[position].current).collect();
            let (Some(v), Some(i)) = (Summary::of(&voltages), Summary::of(&currents)) else {
                return Err(DaqError::SampleFormat {
                    path: first.path.clone(),
                    reason: format!("no samples at row {}", position),
                });
            };
            Ok(AggregatedRow {
                mean_voltage: v.mean,
                std_voltage: v.std,
                mean_current: i.mean,
                std_current: i.std,
            })
        })
        .collect()
}
