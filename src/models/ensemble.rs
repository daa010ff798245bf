//! Detector ensemble: one fitted detector per feature, built once from history

use super::detector::{
    self, ColumnDetector, DetectorConfig, DetectorOutput, Direction, FittedDetector, ScoreBounds,
};
use crate::error::{DetectionError, Result};
use crate::feature_extractor::{Feature, FeatureVector, FEATURE_COUNT};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Detector assignment for one feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureDetectorConfig {
    pub feature: Feature,
    pub detector: DetectorConfig,
}

/// Static per-feature detector table plus the threshold score clamp
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnsembleConfig {
    /// Lowest score a threshold detector reports
    #[serde(default = "default_score_floor")]
    pub score_floor: f64,
    /// Highest score a threshold detector reports
    #[serde(default = "default_score_ceiling")]
    pub score_ceiling: f64,
    /// One entry per feature
    pub features: Vec<FeatureDetectorConfig>,
}

fn default_score_floor() -> f64 {
    ScoreBounds::default().floor
}

fn default_score_ceiling() -> f64 {
    ScoreBounds::default().ceiling
}

impl EnsembleConfig {
    pub fn bounds(&self) -> ScoreBounds {
        ScoreBounds {
            floor: self.score_floor,
            ceiling: self.score_ceiling,
        }
    }

    /// Detector configured for a feature. Fails if the feature is missing or
    /// listed more than once.
    pub fn detector_for(&self, feature: Feature) -> Result<&DetectorConfig> {
        let mut matches = self.features.iter().filter(|entry| entry.feature == feature);
        let first = matches
            .next()
            .ok_or_else(|| DetectionError::MissingDetectorConfig(feature.name().to_string()))?;

        if matches.next().is_some() {
            return Err(DetectionError::InvalidDetectorConfig {
                feature: feature.name().to_string(),
                reason: "configured more than once".to_string(),
            });
        }
        Ok(&first.detector)
    }
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        let threshold = DetectorConfig::Threshold {
            percentile: 95.0,
            direction: Direction::Upper,
        };
        let forest = DetectorConfig::IsolationForest {
            contamination: 0.02,
            n_estimators: 100,
            seed: 42,
        };

        let features = Feature::ALL
            .iter()
            .map(|&feature| FeatureDetectorConfig {
                feature,
                detector: match feature {
                    Feature::NumItems | Feature::NumItemTypes | Feature::BorrowDurationHours => {
                        threshold
                    }
                    Feature::BorrowHourSin
                    | Feature::BorrowHourCos
                    | Feature::BorrowDaySin
                    | Feature::BorrowDayCos
                    | Feature::IsUnusualHour => forest,
                },
            })
            .collect();

        Self {
            score_floor: default_score_floor(),
            score_ceiling: default_score_ceiling(),
            features,
        }
    }
}

/// Immutable set of fitted detectors, indexed by feature order.
///
/// Built once at startup and shared read-only (behind an `Arc`) by every
/// scoring call.
#[derive(Debug, Clone, Default)]
pub struct DetectorEnsemble {
    detectors: Vec<(Feature, FittedDetector)>,
}

impl DetectorEnsemble {
    /// Fit one detector per feature from a historical feature matrix.
    ///
    /// Deterministic for identical history and configuration. Any column that
    /// cannot be fitted fails the whole build.
    pub fn build(history: &[FeatureVector], config: &EnsembleConfig) -> Result<Self> {
        let bounds = config.bounds();
        bounds.validate().map_err(|e| e.for_feature("score_bounds"))?;
        let mut detectors = Vec::with_capacity(FEATURE_COUNT);

        for feature in Feature::ALL {
            let detector_config = config.detector_for(feature)?;
            let column: Vec<f64> = history.iter().map(|row| row.get(feature)).collect();
            let fitted = detector::fit(feature, &column, detector_config, bounds)?;
            detectors.push((feature, fitted));
        }

        info!(
            samples = history.len(),
            detectors = detectors.len(),
            "Detector ensemble built"
        );

        Ok(Self { detectors })
    }

    /// True once every feature has a fitted detector
    pub fn is_ready(&self) -> bool {
        self.detectors.len() == FEATURE_COUNT
    }

    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    pub fn detector(&self, feature: Feature) -> Option<&FittedDetector> {
        self.detectors
            .iter()
            .find(|(f, _)| *f == feature)
            .map(|(_, detector)| detector)
    }

    /// Run every detector over its column of the batch.
    ///
    /// Returns one output row per feature, each with one entry per batch item.
    /// Columns are independent and are scored in parallel.
    pub fn score_columns(
        &self,
        batch: &[FeatureVector],
    ) -> Result<Vec<(Feature, Vec<DetectorOutput>)>> {
        if !self.is_ready() {
            return Err(DetectionError::EnsembleNotReady);
        }

        Ok(self
            .detectors
            .par_iter()
            .map(|(feature, detector)| {
                let column: Vec<f64> = batch.iter().map(|row| row.get(*feature)).collect();
                (*feature, detector.score_column(&column))
            })
            .collect())
    }
}
