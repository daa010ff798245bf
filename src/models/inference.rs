//! Scoring engine: applies the detector ensemble to a batch of feature vectors

use crate::error::{DetectionError, Result};
use crate::feature_extractor::FeatureVector;
use crate::models::aggregator::{ScoreAggregator, Verdict};
use crate::models::ensemble::DetectorEnsemble;
use crate::types::result::AnomalyResult;
use std::sync::Arc;
use tracing::debug;

/// A feature vector tagged with the borrow request it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ScoringInput {
    pub borrow_request_id: String,
    pub features: FeatureVector,
}

impl ScoringInput {
    pub fn new(borrow_request_id: impl Into<String>, features: FeatureVector) -> Self {
        Self {
            borrow_request_id: borrow_request_id.into(),
            features,
        }
    }
}

/// Score raw feature vectors, one verdict per vector in input order.
///
/// The ensemble must be built; an empty batch then yields an empty result.
pub fn score_vectors(batch: &[FeatureVector], ensemble: &DetectorEnsemble) -> Result<Vec<Verdict>> {
    if !ensemble.is_ready() {
        return Err(DetectionError::EnsembleNotReady);
    }
    if batch.is_empty() {
        return Ok(Vec::new());
    }

    let columns = ensemble.score_columns(batch)?;
    Ok(ScoreAggregator::aggregate_columns(&columns, batch.len()))
}

/// Score a batch, producing one `AnomalyResult` per input in input order.
pub fn score(batch: &[ScoringInput], ensemble: &DetectorEnsemble) -> Result<Vec<AnomalyResult>> {
    let vectors: Vec<FeatureVector> = batch.iter().map(|input| input.features).collect();
    let verdicts = score_vectors(&vectors, ensemble)?;

    Ok(batch
        .iter()
        .zip(verdicts)
        .map(|(input, verdict)| {
            debug!(
                borrow_request_id = %input.borrow_request_id,
                score = verdict.score,
                is_anomaly = verdict.is_anomaly,
                triggered = ?verdict.triggered_features,
                "Transaction scored"
            );
            AnomalyResult::new(input.borrow_request_id.clone(), verdict.score, verdict.is_anomaly)
                .with_triggered_features(verdict.triggered_features)
        })
        .collect())
}

/// Scoring engine holding a shared, immutable ensemble snapshot.
///
/// Cloning the engine shares the same ensemble; scoring never mutates it, so
/// any number of handlers can score concurrently without locking.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    ensemble: Arc<DetectorEnsemble>,
}

impl ScoringEngine {
    pub fn new(ensemble: Arc<DetectorEnsemble>) -> Self {
        Self { ensemble }
    }

    pub fn ensemble(&self) -> &DetectorEnsemble {
        &self.ensemble
    }

    pub fn is_ready(&self) -> bool {
        self.ensemble.is_ready()
    }

    /// Score a batch against the held ensemble
    pub fn score(&self, batch: &[ScoringInput]) -> Result<Vec<AnomalyResult>> {
        score(batch, &self.ensemble)
    }
}
