//! Mean and population standard deviation.

/// Arithmetic mean, or `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by N), or `None` for an empty slice.
pub fn population_std(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Mean and spread of one column at one position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    /// Arithmetic mean
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

impl Summary {
    /// Summarise `values`, `None` when empty.
    pub fn of(values: &[f64]) -> Option<Self> {
        Some(Self {
            mean: mean(values)?,
            std: population_std(values)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_form() {
        let s = Summary::of(&[1.0, 2.0, 3.0]).unwrap();
        assert_eq!(s.mean, 2.0);
        assert!((s.std - (2.0_f64 / 3.0).sqrt()).abs() < 1e-15);
    }

    #[test]
    fn single_value_has_zero_spread() {
        let s = Summary::of(&[0.7]).unwrap();
        assert_eq!(s.mean, 0.7);
        assert_eq!(s.std, 0.0);
    }

    #[test]
    fn empty_input_has_no_summary() {
        assert_eq!(mean(&[]), None);
        assert_eq!(population_std(&[]), None);
        assert!(Summary::of(&[]).is_none());
    }

    #[test]
    fn two_point_spread_is_half_the_gap() {
        let s = Summary::of(&[0.1, 0.3]).unwrap();
        assert!((s.mean - 0.2).abs() < 1e-15);
        assert!((s.std - 0.1).abs() < 1e-15);
    }
}
