//! Per-feature detectors
//!
//! Two detector families share one capability: given a column of values for
//! their feature, return a score and a flag per value. Which family scores a
//! feature is fixed by configuration at fit time.

use super::isolation_forest::{IsolationForest, IsolationForestParams, MIN_SAMPLES};
use super::scaler::RobustScaler;
use super::stats;
use crate::error::{DetectionError, Result};
use crate::feature_extractor::Feature;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which tail of a threshold detector is anomalous
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Values above the threshold are anomalous
    Upper,
    /// Values below the threshold are anomalous
    Lower,
}

fn default_n_estimators() -> usize {
    100
}

fn default_seed() -> u64 {
    42
}

/// Detector kind and parameters for one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectorConfig {
    /// One-sided percentile cutoff, for count-like and duration-like features
    Threshold { percentile: f64, direction: Direction },
    /// Robust-scaled isolation forest, for multi-modal features
    IsolationForest {
        contamination: f64,
        #[serde(default = "default_n_estimators")]
        n_estimators: usize,
        #[serde(default = "default_seed")]
        seed: u64,
    },
}

/// Clamp range for threshold-detector scores, keeping them on a scale
/// comparable to isolation-forest decision scores
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBounds {
    pub floor: f64,
    pub ceiling: f64,
}

impl ScoreBounds {
    /// The floor must lie strictly below the ceiling
    pub fn validate(&self) -> Result<()> {
        if self.floor < self.ceiling {
            return Ok(());
        }
        Err(DetectionError::InvalidDetectorConfig {
            feature: String::new(),
            reason: format!(
                "score floor {} must be below ceiling {}",
                self.floor, self.ceiling
            ),
        })
    }
}

impl Default for ScoreBounds {
    fn default() -> Self {
        Self {
            floor: -5.0,
            ceiling: 1.0,
        }
    }
}

/// Score and flag for one value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorOutput {
    /// Lower = more anomalous
    pub score: f64,
    pub is_anomaly: bool,
}

/// Scores a column of values of a single feature
pub trait ColumnDetector: Send + Sync {
    fn score_column(&self, column: &[f64]) -> Vec<DetectorOutput>;

    /// Detector family name
    fn kind(&self) -> &'static str;
}

/// Percentile threshold detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdDetector {
    threshold: f64,
    direction: Direction,
    mean: f64,
    std: f64,
    bounds: ScoreBounds,
}

impl ThresholdDetector {
    /// Fit on a column. `upper` uses the `percentile`-th percentile as cutoff,
    /// `lower` uses the `(100 - percentile)`-th.
    pub fn fit(
        column: &[f64],
        percentile: f64,
        direction: Direction,
        bounds: ScoreBounds,
    ) -> Result<Self> {
        if !(0.0..=100.0).contains(&percentile) {
            return Err(DetectionError::InvalidDetectorConfig {
                feature: String::new(),
                reason: format!("percentile {percentile} outside [0, 100]"),
            });
        }
        bounds.validate()?;

        let q = match direction {
            Direction::Upper => percentile,
            Direction::Lower => 100.0 - percentile,
        };
        let threshold =
            stats::percentile(column, q).ok_or(DetectionError::InsufficientData {
                feature: String::new(),
                required: 1,
                actual: 0,
            })?;

        Ok(Self {
            threshold,
            direction,
            mean: stats::mean(column),
            std: stats::std_dev(column),
            bounds,
        })
    }

    #[cfg(test)]
    fn with_threshold(threshold: f64, direction: Direction, std: f64) -> Self {
        Self {
            threshold,
            direction,
            mean: threshold,
            std,
            bounds: ScoreBounds::default(),
        }
    }

    pub fn score_value(&self, value: f64) -> DetectorOutput {
        let spread = if self.std > 0.0 { self.std } else { 1.0 };
        let (is_anomaly, raw) = match self.direction {
            Direction::Upper => (value > self.threshold, -(value - self.threshold) / spread),
            Direction::Lower => (value < self.threshold, (value - self.threshold) / spread),
        };

        DetectorOutput {
            // + 0.0 turns a -0.0 at the threshold into 0.0
            score: raw.clamp(self.bounds.floor, self.bounds.ceiling) + 0.0,
            is_anomaly,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    pub fn std(&self) -> f64 {
        self.std
    }
}

impl ColumnDetector for ThresholdDetector {
    fn score_column(&self, column: &[f64]) -> Vec<DetectorOutput> {
        column.iter().map(|&v| self.score_value(v)).collect()
    }

    fn kind(&self) -> &'static str {
        "threshold"
    }
}

/// Robust scaler followed by an isolation forest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestDetector {
    scaler: RobustScaler,
    forest: IsolationForest,
}

impl ForestDetector {
    pub fn fit(column: &[f64], params: IsolationForestParams) -> Result<Self> {
        if column.len() < MIN_SAMPLES {
            return Err(DetectionError::InsufficientData {
                feature: String::new(),
                required: MIN_SAMPLES,
                actual: column.len(),
            });
        }

        let scaler = RobustScaler::fit(column);
        let forest = params.fit(&scaler.transform(column))?;

        Ok(Self { scaler, forest })
    }

}

impl ColumnDetector for ForestDetector {
    fn score_column(&self, column: &[f64]) -> Vec<DetectorOutput> {
        let scaled = self.scaler.transform(column);
        self.forest
            .decision_function(&scaled)
            .into_iter()
            .zip(self.forest.predict(&scaled))
            .map(|(score, is_anomaly)| DetectorOutput { score, is_anomaly })
            .collect()
    }

    fn kind(&self) -> &'static str {
        "isolation_forest"
    }
}

/// A fitted detector of either family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FittedDetector {
    Threshold(ThresholdDetector),
    IsolationForest(ForestDetector),
}

impl ColumnDetector for FittedDetector {
    fn score_column(&self, column: &[f64]) -> Vec<DetectorOutput> {
        match self {
            FittedDetector::Threshold(detector) => detector.score_column(column),
            FittedDetector::IsolationForest(detector) => detector.score_column(column),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            FittedDetector::Threshold(detector) => detector.kind(),
            FittedDetector::IsolationForest(detector) => detector.kind(),
        }
    }
}

/// Fit the configured detector for one feature column.
pub fn fit(
    feature: Feature,
    column: &[f64],
    config: &DetectorConfig,
    bounds: ScoreBounds,
) -> Result<FittedDetector> {
    let fitted = match *config {
        DetectorConfig::Threshold {
            percentile,
            direction,
        } => ThresholdDetector::fit(column, percentile, direction, bounds).map(|detector| {
            debug!(
                feature = %feature,
                threshold = detector.threshold,
                direction = ?detector.direction,
                mean = detector.mean,
                std = detector.std,
                "Fitted threshold detector"
            );
            FittedDetector::Threshold(detector)
        }),
        DetectorConfig::IsolationForest {
            contamination,
            n_estimators,
            seed,
        } => {
            let params = IsolationForestParams {
                n_estimators,
                contamination,
                seed,
            };
            ForestDetector::fit(column, params).map(|detector| {
                debug!(
                    feature = %feature,
                    center = detector.scaler.center(),
                    scale = detector.scaler.scale(),
                    offset = detector.forest.offset(),
                    contamination = detector.forest.contamination(),
                    n_estimators = detector.forest.n_estimators(),
                    "Fitted isolation forest detector"
                );
                FittedDetector::IsolationForest(detector)
            })
        }
    };

    fitted.map_err(|e| e.for_feature(feature.name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upper(percentile: f64) -> DetectorConfig {
        DetectorConfig::Threshold {
            percentile,
            direction: Direction::Upper,
        }
    }

    #[test]
    fn test_upper_threshold_is_percentile() {
        let column: Vec<f64> = (1..=100).map(f64::from).collect();
        let detector =
            ThresholdDetector::fit(&column, 95.0, Direction::Upper, ScoreBounds::default())
                .unwrap();

        assert!((detector.threshold() - 95.05).abs() < 1e-9);
        assert!((detector.mean() - 50.5).abs() < 1e-9);
    }

    #[test]
    fn test_lower_threshold_uses_complement() {
        let column: Vec<f64> = (1..=100).map(f64::from).collect();
        let detector =
            ThresholdDetector::fit(&column, 95.0, Direction::Lower, ScoreBounds::default())
                .unwrap();

        assert!((detector.threshold() - 5.95).abs() < 1e-9);
    }

    #[test]
    fn test_upper_monotonic_flagging() {
        let detector = ThresholdDetector::with_threshold(10.0, Direction::Upper, 2.0);

        assert!(!detector.score_value(10.0).is_anomaly);
        assert!(!detector.score_value(-3.0).is_anomaly);
        assert!(detector.score_value(10.0001).is_anomaly);
        assert!(detector.score_value(1e6).is_anomaly);

        assert!((detector.score_value(12.0).score + 1.0).abs() < 1e-12);
        assert!((detector.score_value(9.0).score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_lower_direction_mirrors() {
        let detector = ThresholdDetector::with_threshold(10.0, Direction::Lower, 2.0);

        assert!(detector.score_value(8.0).is_anomaly);
        assert!(!detector.score_value(10.0).is_anomaly);
        assert!((detector.score_value(8.0).score + 1.0).abs() < 1e-12);
        assert!((detector.score_value(11.0).score - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_scores_clamped() {
        let detector = ThresholdDetector::with_threshold(10.0, Direction::Upper, 1.0);

        assert_eq!(detector.score_value(1000.0).score, -5.0);
        assert_eq!(detector.score_value(-1000.0).score, 1.0);
    }

    #[test]
    fn test_score_at_threshold_is_positive_zero() {
        let detector = ThresholdDetector::with_threshold(10.0, Direction::Upper, 2.0);
        let output = detector.score_value(10.0);

        assert_eq!(output.score, 0.0);
        assert!(output.score.is_sign_positive());
        assert_eq!(serde_json::json!(output.score).to_string(), "0.0");
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let bounds = ScoreBounds {
            floor: 1.0,
            ceiling: 1.0,
        };
        assert!(bounds.validate().is_err());
        assert!(ThresholdDetector::fit(&[1.0, 2.0], 95.0, Direction::Upper, bounds).is_err());
        assert!(ScoreBounds::default().validate().is_ok());
    }

    #[test]
    fn test_zero_std_uses_unit_spread() {
        let detector = fit(
            Feature::NumItemTypes,
            &[1.0; 20],
            &upper(95.0),
            ScoreBounds::default(),
        )
        .unwrap();

        let outputs = detector.score_column(&[1.0, 3.0]);
        assert!(!outputs[0].is_anomaly);
        assert!(outputs[1].is_anomaly);
        assert_eq!(outputs[1].score, -2.0);
        assert_eq!(detector.kind(), "threshold");
    }

    #[test]
    fn test_threshold_empty_column() {
        let err = fit(Feature::NumItems, &[], &upper(95.0), ScoreBounds::default()).unwrap_err();
        assert_eq!(
            err,
            DetectionError::InsufficientData {
                feature: "num_items".to_string(),
                required: 1,
                actual: 0,
            }
        );
    }

    #[test]
    fn test_invalid_percentile_names_feature() {
        let err = fit(
            Feature::BorrowDurationHours,
            &[1.0, 2.0],
            &upper(120.0),
            ScoreBounds::default(),
        )
        .unwrap_err();

        assert!(matches!(
            err,
            DetectionError::InvalidDetectorConfig { ref feature, .. }
                if feature == "borrow_duration_hours"
        ));
    }

    #[test]
    fn test_forest_needs_two_samples() {
        let config = DetectorConfig::IsolationForest {
            contamination: 0.1,
            n_estimators: 10,
            seed: 42,
        };
        let err = fit(Feature::BorrowHourSin, &[0.5], &config, ScoreBounds::default())
            .unwrap_err();

        assert_eq!(
            err,
            DetectionError::InsufficientData {
                feature: "borrow_hour_sin".to_string(),
                required: 2,
                actual: 1,
            }
        );
    }

    #[test]
    fn test_forest_detector_flags_unseen_indicator() {
        let config = DetectorConfig::IsolationForest {
            contamination: 0.02,
            n_estimators: 50,
            seed: 42,
        };
        let detector =
            fit(Feature::IsUnusualHour, &[0.0; 100], &config, ScoreBounds::default()).unwrap();

        let outputs = detector.score_column(&[0.0, 1.0]);
        assert!(!outputs[0].is_anomaly);
        assert!(outputs[1].is_anomaly);
        assert!(outputs[1].score < outputs[0].score);
        assert_eq!(detector.kind(), "isolation_forest");

        // Flags come from the fitted forest's own prediction
        if let FittedDetector::IsolationForest(forest_detector) = &detector {
            let scaled = forest_detector.scaler.transform(&[0.0, 1.0]);
            assert_eq!(forest_detector.forest.predict(&scaled), vec![false, true]);
        } else {
            panic!("expected an isolation forest detector");
        }
    }

    #[test]
    fn test_config_deserializes_by_kind() {
        let json = r#"{"kind": "isolation_forest", "contamination": 0.05}"#;
        let config: DetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            DetectorConfig::IsolationForest {
                contamination: 0.05,
                n_estimators: 100,
                seed: 42,
            }
        );

        let json = r#"{"kind": "threshold", "percentile": 90.0, "direction": "lower"}"#;
        let config: DetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(
            config,
            DetectorConfig::Threshold {
                percentile: 90.0,
                direction: Direction::Lower,
            }
        );
    }
}
