//! NATS publisher for batch replies and anomaly events

use crate::pipeline::Reply;
use crate::types::result::{AnomalyEvent, AnomalyResult};
use anyhow::Result;
use async_nats::{Client, Subject};
use tracing::{debug, error};

/// Publishes scoring replies and per-anomaly events
#[derive(Clone)]
pub struct ResultProducer {
    client: Client,
    anomaly_subject: String,
}

impl ResultProducer {
    /// Create a new result producer
    pub fn new(client: Client, anomaly_subject: &str) -> Self {
        Self {
            client,
            anomaly_subject: anomaly_subject.to_string(),
        }
    }

    /// Send a batch reply to the requester
    pub async fn reply(&self, reply_subject: Subject, reply: &Reply) -> Result<()> {
        let payload = serde_json::to_vec(reply)?;
        self.client.publish(reply_subject, payload.into()).await?;
        Ok(())
    }

    /// Publish an event for one flagged transaction
    pub async fn publish_anomaly(&self, result: &AnomalyResult) -> Result<()> {
        let payload = serde_json::to_vec(&AnomalyEvent::new(result.clone()))?;

        self.client
            .publish(self.anomaly_subject.clone(), payload.into())
            .await?;

        debug!(
            borrow_request_id = %result.borrow_request_id,
            score = result.score,
            "Published anomaly event"
        );

        Ok(())
    }

    /// Publish events for every flagged result in a batch
    pub async fn publish_anomalies(&self, results: &[AnomalyResult]) {
        for result in results.iter().filter(|r| r.is_anomaly) {
            if let Err(e) = self.publish_anomaly(result).await {
                error!(
                    borrow_request_id = %result.borrow_request_id,
                    error = %e,
                    "Failed to publish anomaly event"
                );
            }
        }
    }

    /// Get the anomaly subject name
    pub fn anomaly_subject(&self) -> &str {
        &self.anomaly_subject
    }
}
