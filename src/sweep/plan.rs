//! Sweep parameters and the commanded voltage grid.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of one linear voltage sweep.
///
/// Immutable for the duration of a run; every repeat of every component uses
/// the same grid so that rows line up by position during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepConfig {
    /// First commanded voltage (V)
    pub start_voltage: f64,
    /// Last commanded voltage (V), reached exactly
    pub end_voltage: f64,
    /// Number of points including both endpoints, at least 2
    pub sample_count: usize,
    /// Wait after each recorded point
    #[serde(with = "humantime_serde", default = "default_inter_sample_delay")]
    pub inter_sample_delay: Duration,
}

fn default_inter_sample_delay() -> Duration {
    Duration::from_millis(50)
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            start_voltage: 0.0,
            end_voltage: 1.0,
            sample_count: 101,
            inter_sample_delay: default_inter_sample_delay(),
        }
    }
}

impl SweepConfig {
    /// Create a sweep and check its invariants.
    pub fn new(
        start_voltage: f64,
        end_voltage: f64,
        sample_count: usize,
        inter_sample_delay: Duration,
    ) -> AppResult<Self> {
        let config = Self {
            start_voltage,
            end_voltage,
            sample_count,
            inter_sample_delay,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject sweeps without a defined step.
    pub fn validate(&self) -> AppResult<()> {
        if self.sample_count < 2 {
            return Err(DaqError::InvalidSweep(format!(
                "sample_count must be at least 2, got {}",
                self.sample_count
            )));
        }
        if !self.start_voltage.is_finite() || !self.end_voltage.is_finite() {
            return Err(DaqError::InvalidSweep(format!(
                "voltage range must be finite, got {}..{}",
                self.start_voltage, self.end_voltage
            )));
        }
        Ok(())
    }

    /// Spacing between consecutive commanded points.
    pub fn step(&self) -> f64 {
        (self.end_voltage - self.start_voltage) / (self.sample_count as f64 - 1.0)
    }

    /// Commanded voltages in sweep order.
    ///
    /// Interior points are `start + i * step`; the last point is pinned to
    /// `end_voltage` so rounding never moves the endpoint.
    pub fn points(&self) -> Vec<f64> {
        let step = self.step();
        let last = self.sample_count.saturating_sub(1);
        (0..self.sample_count)
            .map(|i| {
                if i == last {
                    self.end_voltage
                } else {
                    self.start_voltage + i as f64 * step
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sweep(start: f64, end: f64, n: usize) -> SweepConfig {
        SweepConfig::new(start, end, n, Duration::ZERO).unwrap()
    }

    #[test]
    fn points_hit_both_endpoints() {
        for (start, end, n) in [(0.0, 1.0, 101), (-2.5, 2.5, 7), (3.0, 0.0, 4), (0.1, 0.7, 2)] {
            let cfg = sweep(start, end, n);
            let pts = cfg.points();
            assert_eq!(pts.len(), n);
            assert_eq!(pts[0], start);
            assert_eq!(pts[n - 1], end);
        }
    }

    #[test]
    fn points_are_uniformly_spaced() {
        let cfg = sweep(-1.0, 2.0, 31);
        let step = cfg.step();
        assert!((step - 0.1).abs() < 1e-12);
        for pair in cfg.points().windows(2) {
            assert!(((pair[1] - pair[0]) - step).abs() < 1e-9);
        }
    }

    #[test]
    fn descending_sweep_has_negative_step() {
        let cfg = sweep(1.0, 0.0, 3);
        assert_eq!(cfg.step(), -0.5);
        assert_eq!(cfg.points(), vec![1.0, 0.5, 0.0]);
    }

    #[test]
    fn single_point_sweep_is_rejected() {
        let err = SweepConfig::new(0.0, 1.0, 1, Duration::ZERO).unwrap_err();
        assert!(matches!(err, DaqError::InvalidSweep(_)));
        assert!(SweepConfig::new(0.0, 1.0, 0, Duration::ZERO).is_err());
    }

    #[test]
    fn non_finite_range_is_rejected() {
        assert!(SweepConfig::new(f64::NAN, 1.0, 5, Duration::ZERO).is_err());
        assert!(SweepConfig::new(0.0, f64::INFINITY, 5, Duration::ZERO).is_err());
    }
}
