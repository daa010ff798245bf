//! Median / IQR scaling for single-column data

use super::stats;
use serde::{Deserialize, Serialize};

/// Robust scaler: centres on the median and divides by the interquartile range,
/// so outliers in the fitting sample do not move the centre or the scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RobustScaler {
    center: f64,
    scale: f64,
}

impl RobustScaler {
    /// Fit on a column. An empty column or a zero spread yields scale 1.
    pub fn fit(column: &[f64]) -> Self {
        let sorted = stats::sorted(column);
        let center = stats::percentile_sorted(&sorted, 50.0).unwrap_or(0.0);
        let q1 = stats::percentile_sorted(&sorted, 25.0).unwrap_or(0.0);
        let q3 = stats::percentile_sorted(&sorted, 75.0).unwrap_or(0.0);

        let iqr = q3 - q1;
        let scale = if iqr.is_finite() && iqr > 0.0 { iqr } else { 1.0 };

        Self { center, scale }
    }

    pub fn transform_value(&self, value: f64) -> f64 {
        (value - self.center) / self.scale
    }

    pub fn transform(&self, column: &[f64]) -> Vec<f64> {
        column.iter().map(|&v| self.transform_value(v)).collect()
    }

    pub fn center(&self) -> f64 {
        self.center
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_median_iqr_scaling() {
        let scaler = RobustScaler::fit(&[1.0, 2.0, 3.0, 4.0, 5.0]);

        assert_eq!(scaler.center(), 3.0);
        assert_eq!(scaler.scale(), 2.0);
        assert_eq!(scaler.transform(&[3.0, 5.0, 1.0]), vec![0.0, 1.0, -1.0]);
    }

    #[test]
    fn test_outlier_does_not_shift_center() {
        let clean = RobustScaler::fit(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let dirty = RobustScaler::fit(&[1.0, 2.0, 3.0, 4.0, 5000.0]);

        assert_eq!(clean.center(), dirty.center());
        assert_eq!(clean.scale(), dirty.scale());
    }

    #[test]
    fn test_zero_spread_uses_unit_scale() {
        let scaler = RobustScaler::fit(&[0.0; 50]);

        assert_eq!(scaler.scale(), 1.0);
        assert_eq!(scaler.transform_value(1.0), 1.0);
    }
}
