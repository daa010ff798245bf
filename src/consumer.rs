//! NATS subscription for incoming borrow batch requests

use crate::config::NatsConfig;
use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use tracing::info;

/// Receives batch scoring requests.
///
/// With a queue group set, replicas of the service share the request subject
/// and each request is delivered to only one of them.
pub struct BatchConsumer {
    client: Client,
    subject: String,
    queue_group: Option<String>,
}

impl BatchConsumer {
    pub fn new(client: Client, subject: &str) -> Self {
        Self {
            client,
            subject: subject.to_string(),
            queue_group: None,
        }
    }

    /// Consumer for the request subject and queue group in `config`
    pub fn from_config(client: Client, config: &NatsConfig) -> Self {
        Self {
            queue_group: config.queue_group.clone(),
            ..Self::new(client, &config.request_subject)
        }
    }

    pub async fn subscribe(&self) -> Result<Subscriber> {
        let subscriber = match &self.queue_group {
            Some(group) => self
                .client
                .queue_subscribe(self.subject.clone(), group.clone())
                .await
                .with_context(|| {
                    format!("Failed to join queue group {group} on {}", self.subject)
                })?,
            None => self
                .client
                .subscribe(self.subject.clone())
                .await
                .with_context(|| format!("Failed to subscribe to {}", self.subject))?,
        };

        info!(
            subject = %self.subject,
            queue_group = self.queue_group.as_deref().unwrap_or("-"),
            "Subscribed to borrow request subject"
        );
        Ok(subscriber)
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn queue_group(&self) -> Option<&str> {
        self.queue_group.as_deref()
    }
}
