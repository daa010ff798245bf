//! Score aggregation across per-feature detectors
//!
//! Detectors are not calibrated to a shared scale, so a weighted mean would let
//! several mildly unusual features mask one severe one. A transaction's score
//! is the minimum of its feature scores and its flag is the OR of its feature
//! flags.

use super::detector::DetectorOutput;
use crate::feature_extractor::Feature;

/// Combined verdict for one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    /// Most anomalous (lowest) feature score
    pub score: f64,
    /// True if any feature detector flagged the transaction
    pub is_anomaly: bool,
    /// Flagged features, in feature order
    pub triggered_features: Vec<Feature>,
}

/// Min-score / any-flag aggregation.
pub struct ScoreAggregator;

impl ScoreAggregator {
    /// Aggregate the per-feature outputs of a single transaction.
    pub fn aggregate(outputs: &[(Feature, DetectorOutput)]) -> Verdict {
        if outputs.is_empty() {
            // Neutral verdict when no detectors ran
            return Verdict {
                score: 0.0,
                is_anomaly: false,
                triggered_features: Vec::new(),
            };
        }

        let triggered_features: Vec<Feature> = outputs
            .iter()
            .filter(|(_, output)| output.is_anomaly)
            .map(|(feature, _)| *feature)
            .collect();

        Verdict {
            score: Self::min_score(outputs.iter().map(|(_, output)| output.score)),
            is_anomaly: !triggered_features.is_empty(),
            triggered_features,
        }
    }

    /// Aggregate column-major detector outputs into one verdict per row.
    pub fn aggregate_columns(
        columns: &[(Feature, Vec<DetectorOutput>)],
        rows: usize,
    ) -> Vec<Verdict> {
        (0..rows)
            .map(|row| {
                let outputs: Vec<(Feature, DetectorOutput)> = columns
                    .iter()
                    .filter_map(|(feature, outputs)| outputs.get(row).map(|o| (*feature, *o)))
                    .collect();
                Self::aggregate(&outputs)
            })
            .collect()
    }

    /// Lowest score; NaN scores are ignored.
    pub fn min_score(scores: impl IntoIterator<Item = f64>) -> f64 {
        scores.into_iter().fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(score: f64, is_anomaly: bool) -> DetectorOutput {
        DetectorOutput { score, is_anomaly }
    }

    #[test]
    fn test_min_score_and_or_flag() {
        let mut outputs = vec![
            (Feature::NumItems, output(0.2, false)),
            (Feature::NumItemTypes, output(-3.0, true)),
            (Feature::BorrowDurationHours, output(0.5, false)),
        ];
        // Many normal features must not dilute the anomalous one
        for feature in &Feature::ALL[3..] {
            outputs.push((*feature, output(1.0, false)));
        }

        let verdict = ScoreAggregator::aggregate(&outputs);

        assert!(verdict.is_anomaly);
        assert_eq!(verdict.score, -3.0);
        assert_eq!(verdict.triggered_features, vec![Feature::NumItemTypes]);
    }

    #[test]
    fn test_all_normal() {
        let outputs = vec![
            (Feature::NumItems, output(0.4, false)),
            (Feature::BorrowHourSin, output(0.01, false)),
        ];

        let verdict = ScoreAggregator::aggregate(&outputs);

        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.score, 0.01);
        assert!(verdict.triggered_features.is_empty());
    }

    #[test]
    fn test_flag_independent_of_score() {
        // A flagged feature need not carry the minimum score
        let outputs = vec![
            (Feature::IsUnusualHour, output(-0.1, true)),
            (Feature::BorrowDurationHours, output(-0.8, false)),
        ];

        let verdict = ScoreAggregator::aggregate(&outputs);

        assert!(verdict.is_anomaly);
        assert_eq!(verdict.score, -0.8);
    }

    #[test]
    fn test_empty_outputs() {
        let verdict = ScoreAggregator::aggregate(&[]);
        assert!(!verdict.is_anomaly);
        assert_eq!(verdict.score, 0.0);
    }

    #[test]
    fn test_aggregate_columns_is_row_wise() {
        let columns = vec![
            (Feature::NumItems, vec![output(0.3, false), output(-5.0, true)]),
            (Feature::BorrowHourCos, vec![output(-0.2, true), output(0.1, false)]),
        ];

        let verdicts = ScoreAggregator::aggregate_columns(&columns, 2);

        assert_eq!(verdicts.len(), 2);
        assert_eq!(verdicts[0].score, -0.2);
        assert_eq!(verdicts[0].triggered_features, vec![Feature::BorrowHourCos]);
        assert_eq!(verdicts[1].score, -5.0);
        assert_eq!(verdicts[1].triggered_features, vec![Feature::NumItems]);
    }

    #[test]
    fn test_min_score_ignores_nan() {
        assert_eq!(ScoreAggregator::min_score([0.5, f64::NAN, -1.0]), -1.0);
    }
}
