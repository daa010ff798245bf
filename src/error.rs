//! Error types for feature extraction, detector fitting and scoring

use thiserror::Error;

/// Errors raised by the anomaly scoring core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    /// A transaction timestamp could not be parsed as a calendar date-time.
    #[error("Malformed input: {field} `{value}` is not a valid date-time")]
    MalformedInput { field: &'static str, value: String },

    /// A historical column is too short for its detector kind.
    #[error("Insufficient data for {feature}: need at least {required} samples, got {actual}")]
    InsufficientData {
        feature: String,
        required: usize,
        actual: usize,
    },

    /// Scoring was attempted against an ensemble that was never built.
    #[error("Detector ensemble is not ready")]
    EnsembleNotReady,

    #[error("No detector configured for feature {0}")]
    MissingDetectorConfig(String),

    #[error("Invalid detector configuration for {feature}: {reason}")]
    InvalidDetectorConfig { feature: String, reason: String },

    /// The historical feature matrix could not be sourced.
    #[error("History unavailable: {0}")]
    History(String),
}

impl DetectionError {
    /// Whether a caller may retry the same request later and expect a different outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DetectionError::EnsembleNotReady)
    }

    /// Attribute a fitting error to a named feature.
    pub fn for_feature(self, name: &str) -> Self {
        match self {
            DetectionError::InsufficientData {
                required, actual, ..
            } => DetectionError::InsufficientData {
                feature: name.to_string(),
                required,
                actual,
            },
            DetectionError::InvalidDetectorConfig { reason, .. } => {
                DetectionError::InvalidDetectorConfig {
                    feature: name.to_string(),
                    reason,
                }
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, DetectionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_input_message() {
        let error = DetectionError::MalformedInput {
            field: "createdAt",
            value: "yesterday".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Malformed input: createdAt `yesterday` is not a valid date-time"
        );
    }

    #[test]
    fn test_insufficient_data_message() {
        let error = DetectionError::InsufficientData {
            feature: "borrow_hour_sin".to_string(),
            required: 2,
            actual: 1,
        };
        assert_eq!(
            error.to_string(),
            "Insufficient data for borrow_hour_sin: need at least 2 samples, got 1"
        );
    }

    #[test]
    fn test_for_feature_names_fitting_errors() {
        let error = DetectionError::InsufficientData {
            feature: String::new(),
            required: 2,
            actual: 0,
        }
        .for_feature("is_unusual_hour");

        assert!(error.to_string().starts_with("Insufficient data for is_unusual_hour"));
        assert_eq!(
            DetectionError::EnsembleNotReady.for_feature("num_items"),
            DetectionError::EnsembleNotReady
        );
    }

    #[test]
    fn test_only_not_ready_is_retryable() {
        assert!(DetectionError::EnsembleNotReady.is_retryable());
        assert!(!DetectionError::MissingDetectorConfig("num_items".to_string()).is_retryable());
    }
}
