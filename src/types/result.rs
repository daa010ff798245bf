//! Scoring output data structures

use crate::feature_extractor::Feature;
use serde::{Deserialize, Serialize};

/// Per-transaction anomaly verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyResult {
    /// Borrow request this verdict belongs to
    pub borrow_request_id: String,

    /// Worst per-feature score (lower = more anomalous)
    pub score: f64,

    /// True if any feature detector flagged the transaction
    pub is_anomaly: bool,

    /// Set out-of-band by a reviewer; always `None` when produced by the engine
    pub is_false_positive: Option<bool>,

    /// Features whose detectors flagged the transaction
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub triggered_features: Vec<Feature>,
}

impl AnomalyResult {
    /// Create a fresh verdict with no reviewer feedback attached
    pub fn new(borrow_request_id: String, score: f64, is_anomaly: bool) -> Self {
        Self {
            borrow_request_id,
            score,
            is_anomaly,
            is_false_positive: None,
            triggered_features: Vec::new(),
        }
    }

    /// Attach the features that triggered the verdict
    pub fn with_triggered_features(mut self, features: Vec<Feature>) -> Self {
        self.triggered_features = features;
        self
    }
}

/// A transaction that could not be scored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedTransaction {
    pub borrow_request_id: String,
    pub reason: String,
}

/// Reply to one batch request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Verdicts in input order, excluding rejected transactions
    pub results: Vec<AnomalyResult>,

    /// Transactions rejected individually (e.g. unparseable timestamps)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rejected: Vec<RejectedTransaction>,
}

/// Batch-level failure reply
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub retryable: bool,
}

/// Event published for every flagged transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyEvent {
    pub event: String,
    pub data: AnomalyResult,
}

impl AnomalyEvent {
    pub const NAME: &'static str = "equipment:anomaly";

    pub fn new(data: AnomalyResult) -> Self {
        Self {
            event: Self::NAME.to_string(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_wire_format() {
        let result = AnomalyResult::new("test-001".to_string(), -0.25, true);

        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["borrowRequestId"], "test-001");
        assert_eq!(json["score"], -0.25);
        assert_eq!(json["isAnomaly"], true);
        assert!(json["isFalsePositive"].is_null());
        assert!(json.get("triggeredFeatures").is_none());
    }

    #[test]
    fn test_triggered_features_serialized_by_name() {
        let result = AnomalyResult::new("test-002".to_string(), -3.0, true)
            .with_triggered_features(vec![Feature::BorrowDurationHours]);

        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["triggeredFeatures"][0], "borrow_duration_hours");
    }

    #[test]
    fn test_event_name() {
        let event = AnomalyEvent::new(AnomalyResult::new("x".to_string(), 0.0, false));
        assert_eq!(event.event, "equipment:anomaly");
    }
}
