//! Remote batch status store client.
//!
//! Persists batch status, metrics, per-stage timing rows, and completion
//! events through an internal HTTP API authenticated with a shared secret.
//! The store owns the database; this worker only posts records.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::error::{PipelineError, Result};
use crate::metrics::BatchMetrics;

/// Batch lifecycle status as persisted remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A status transition for one batch, with optional failure context.
#[derive(Debug, Clone, Serialize)]
pub struct StatusUpdate {
    pub batch_id: String,
    pub status: BatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact_paths: Option<BTreeMap<String, String>>,
}

impl StatusUpdate {
    pub fn new(batch_id: impl Into<String>, status: BatchStatus) -> Self {
        Self {
            batch_id: batch_id.into(),
            status,
            error_stage: None,
            error_message: None,
            retry_count: None,
            artifact_paths: None,
        }
    }
}

/// One persisted per-stage timing row.
#[derive(Debug, Clone, Serialize)]
pub struct StageRow {
    pub stage: String,
    pub duration_seconds: f64,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Event published once per terminal batch state.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionEvent {
    pub batch_id: String,
    pub user_id: String,
    pub status: BatchStatus,
    pub recording_started_at: String,
    pub artifact_paths: BTreeMap<String, String>,
    pub published_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Remote status store operations.
#[async_trait]
pub trait StatusStore: Send + Sync {
    async fn update_status(&self, update: &StatusUpdate) -> Result<()>;
    async fn update_metrics(&self, metrics: &BatchMetrics) -> Result<()>;
    async fn insert_stage_rows(&self, batch_id: &str, rows: &[StageRow]) -> Result<()>;
    async fn publish_completion_event(&self, event: &CompletionEvent) -> Result<()>;
}

pub struct HttpStatusStore {
    base_url: String,
    internal_secret: String,
    client: reqwest::Client,
}

impl HttpStatusStore {
    pub fn new(base_url: &str, internal_secret: &str) -> Result<Self> {
        if base_url.is_empty() {
            return Err(PipelineError::config("status store base url is required"));
        }
        if internal_secret.is_empty() {
            return Err(PipelineError::config("status store internal secret is required"));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            internal_secret: internal_secret.to_string(),
            client: reqwest::Client::new(),
        })
    }

    async fn post(&self, path: &str, operation: &'static str, payload: &Value) -> Result<()> {
        let response = self
            .client
            .post(format!("{}{path}", self.base_url))
            .header("X-Internal-Secret", &self.internal_secret)
            .json(payload)
            .send()
            .await
            .map_err(|e| PipelineError::network(operation, e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(PipelineError::network(
                operation,
                format!("HTTP {status}"),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PipelineError::storage(
                operation,
                format!("HTTP {status}: {body}"),
            ));
        }
        Ok(())
    }

    /// Metrics payload for the batch-status endpoint, stamped with the
    /// completion time.
    pub(crate) fn metrics_payload(metrics: &BatchMetrics) -> Value {
        let mut payload = serde_json::json!({
            "batch_id": metrics.batch_id,
            "status": metrics.status,
            "processing_completed_at": Utc::now().to_rfc3339(),
            "processing_wall_time_seconds": metrics.processing_wall_time_seconds,
            "raw_audio_duration_seconds": metrics.raw_audio_duration_seconds,
            "speech_duration_seconds": metrics.speech_duration_seconds,
            "speech_ratio": metrics.speech_ratio,
            "raw_audio_size_bytes": metrics.raw_audio_size_bytes,
            "cleaned_audio_size_bytes": metrics.cleaned_audio_size_bytes,
            "asr_job_id": metrics.asr_job_id,
            "asr_cost_estimate": metrics.asr_cost_estimate,
            "retry_count": metrics.retry_count,
        });
        if let Some(stage) = &metrics.error_stage {
            payload["error_stage"] = Value::String(stage.clone());
        }
        if let Some(message) = &metrics.error_message {
            payload["error_message"] = Value::String(message.clone());
        }
        payload
    }
}

#[async_trait]
impl StatusStore for HttpStatusStore {
    async fn update_status(&self, update: &StatusUpdate) -> Result<()> {
        let payload = serde_json::to_value(update)
            .map_err(|e| PipelineError::storage("update_status", e.to_string()))?;
        self.post("/internal/batch-status", "update_status", &payload)
            .await
    }

    async fn update_metrics(&self, metrics: &BatchMetrics) -> Result<()> {
        let payload = Self::metrics_payload(metrics);
        self.post("/internal/batch-status", "update_metrics", &payload)
            .await
    }

    async fn insert_stage_rows(&self, batch_id: &str, rows: &[StageRow]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let payload = serde_json::json!({
            "batch_id": batch_id,
            "stages": rows,
        });
        self.post(
            "/internal/processing-stages",
            "insert_stage_rows",
            &payload,
        )
        .await
    }

    async fn publish_completion_event(&self, event: &CompletionEvent) -> Result<()> {
        let payload = serde_json::to_value(event)
            .map_err(|e| PipelineError::storage("publish_completion_event", e.to_string()))?;
        self.post(
            "/internal/publish-event",
            "publish_completion_event",
            &payload,
        )
        .await
    }
}
