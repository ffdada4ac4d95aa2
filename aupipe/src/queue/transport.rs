//! HTTP pull queue transport.
//!
//! At-least-once, lease-based delivery: every pulled message carries a lease
//! id that must be acked or nacked before the visibility timeout expires,
//! otherwise the message becomes redeliverable.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::{PipelineError, Result};

/// A message received from a remote queue.
#[derive(Debug, Clone)]
pub struct QueueMessage {
    pub message_id: String,
    pub lease_id: String,
    pub body: Value,
}

/// Pull/ack/nack operations against a remote queue service.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Pull up to `batch_size` messages, leased for `visibility_timeout`.
    async fn pull(
        &self,
        queue_id: &str,
        batch_size: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>>;

    /// Acknowledge a processed message by lease id.
    async fn ack(&self, queue_id: &str, lease_id: &str) -> Result<()>;

    /// Return a message to the queue for redelivery.
    async fn nack(&self, queue_id: &str, lease_id: &str) -> Result<()>;
}

/// HTTP pull client with bearer-token authentication.
pub struct PullQueueClient {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl PullQueueClient {
    pub fn new(base_url: &str, token: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(PipelineError::config("queue api url is required"));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            client: reqwest::Client::new(),
        })
    }

    async fn post(
        &self,
        queue_id: &str,
        action: &str,
        operation: &'static str,
        payload: &Value,
    ) -> Result<Value> {
        let url = format!("{}/queues/{queue_id}/messages/{action}", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await
            .map_err(|e| PipelineError::queue(operation, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::queue(
                operation,
                format!("HTTP {status}: {body}"),
            ));
        }

        response
            .json()
            .await
            .map_err(|e| PipelineError::queue(operation, format!("invalid response: {e}")))
    }

    /// Parse the pull response, skipping structurally malformed entries.
    pub(crate) fn parse_messages(body: &Value) -> Vec<QueueMessage> {
        let Some(entries) = body["result"]["messages"].as_array() else {
            return vec![];
        };

        let mut messages = Vec::with_capacity(entries.len());
        for entry in entries {
            let (Some(message_id), Some(lease_id)) =
                (entry["id"].as_str(), entry["lease_id"].as_str())
            else {
                warn!(entry = %entry, "malformed queue message structure, skipping");
                continue;
            };
            messages.push(QueueMessage {
                message_id: message_id.to_string(),
                lease_id: lease_id.to_string(),
                body: entry["body"].clone(),
            });
        }
        messages
    }
}

#[async_trait]
impl QueueTransport for PullQueueClient {
    async fn pull(
        &self,
        queue_id: &str,
        batch_size: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>> {
        let payload = serde_json::json!({
            "batch_size": batch_size,
            "visibility_timeout_ms": visibility_timeout.as_millis() as u64,
        });
        let body = self.post(queue_id, "pull", "pull", &payload).await?;
        Ok(Self::parse_messages(&body))
    }

    async fn ack(&self, queue_id: &str, lease_id: &str) -> Result<()> {
        let payload = serde_json::json!({"acks": [{"lease_id": lease_id}]});
        self.post(queue_id, "ack", "ack", &payload).await?;
        Ok(())
    }

    async fn nack(&self, queue_id: &str, lease_id: &str) -> Result<()> {
        let payload = serde_json::json!({"nacks": [{"lease_id": lease_id}]});
        self.post(queue_id, "nack", "nack", &payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_missing_base_url() {
        assert!(PullQueueClient::new("", "tok").is_err());
    }

    #[test]
    fn parse_messages_reads_pull_envelope() {
        let body = serde_json::json!({"result": {"messages": [
            {"id": "m1", "lease_id": "l1", "body": {"batch_id": "b1"}},
            {"id": "m2", "lease_id": "l2", "body": "{\"batch_id\": \"b2\"}"},
        ]}});

        let messages = PullQueueClient::parse_messages(&body);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].message_id, "m1");
        assert_eq!(messages[0].lease_id, "l1");
        assert!(messages[1].body.is_string());
    }

    #[test]
    fn parse_messages_skips_malformed_entries() {
        let body = serde_json::json!({"result": {"messages": [
            {"id": "m1", "body": {}},
            {"id": "m2", "lease_id": "l2", "body": {}},
        ]}});

        let messages = PullQueueClient::parse_messages(&body);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].message_id, "m2");
    }

    #[test]
    fn parse_messages_handles_empty_result() {
        assert!(PullQueueClient::parse_messages(&serde_json::json!({})).is_empty());
    }
}
