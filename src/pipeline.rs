//! Batch handling: decode, extract, score, and shape the reply

use crate::error::Result;
use crate::feature_extractor::FeatureExtractor;
use crate::models::inference::{ScoringEngine, ScoringInput};
use crate::types::result::{BatchResponse, ErrorResponse, RejectedTransaction};
use crate::types::transaction::BorrowTransaction;
use serde::Serialize;
use tracing::warn;

/// Reply to a batch request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reply {
    Scored(BatchResponse),
    Failed(ErrorResponse),
}

/// Extract and score a batch.
///
/// Transactions with unparseable timestamps are rejected individually and the
/// rest of the batch is still scored. Results keep input order.
pub fn score_transactions(
    extractor: &FeatureExtractor,
    engine: &ScoringEngine,
    transactions: &[BorrowTransaction],
) -> Result<BatchResponse> {
    let mut inputs = Vec::with_capacity(transactions.len());
    let mut rejected = Vec::new();

    for tx in transactions {
        match extractor.extract(tx) {
            Ok(features) => inputs.push(ScoringInput::new(tx.borrow_request_id.clone(), features)),
            Err(e) => {
                warn!(
                    borrow_request_id = %tx.borrow_request_id,
                    error = %e,
                    "Rejecting malformed transaction"
                );
                rejected.push(RejectedTransaction {
                    borrow_request_id: tx.borrow_request_id.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    let results = engine.score(&inputs)?;
    Ok(BatchResponse { results, rejected })
}

/// Decode a JSON batch payload and score it, turning every failure into an
/// error reply.
pub fn handle_payload(
    extractor: &FeatureExtractor,
    engine: &ScoringEngine,
    payload: &[u8],
) -> Reply {
    let transactions: Vec<BorrowTransaction> = match serde_json::from_slice(payload) {
        Ok(transactions) => transactions,
        Err(e) => {
            warn!(error = %e, "Failed to deserialize borrow batch");
            return Reply::Failed(ErrorResponse {
                error: format!("Invalid batch payload: {e}"),
                retryable: false,
            });
        }
    };

    match score_transactions(extractor, engine, &transactions) {
        Ok(response) => Reply::Scored(response),
        Err(e) => Reply::Failed(ErrorResponse {
            error: e.to_string(),
            retryable: e.is_retryable(),
        }),
    }
}
