//! Worker configuration from environment variables.

use std::time::Duration;

use crate::error::{PipelineError, Result};
use crate::queue::ConsumerConfig;

const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
const DEFAULT_BATCH_SIZE: usize = 10;
/// Lease floor: the visibility timeout must exceed the longest expected
/// end-to-end batch duration, or a lease could expire mid-processing and
/// the message would be redelivered while still being worked on.
const MIN_VISIBILITY_TIMEOUT_SECS: u64 = 300;
const DEFAULT_VISIBILITY_TIMEOUT_SECS: u64 = 600;
const DEFAULT_HEALTH_PORT: u16 = 8080;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub queue_api_url: String,
    pub priority_queue_id: String,
    pub normal_queue_id: String,
    pub queue_api_token: String,
    pub poll_interval: Duration,
    pub batch_size: usize,
    pub visibility_timeout: Duration,
    pub blob_base_url: String,
    pub blob_bucket: String,
    pub blob_token: String,
    pub status_store_url: String,
    pub status_store_secret: String,
    pub transcoder_provider: String,
    pub vad_provider: String,
    pub denoise_provider: String,
    pub asr_provider: String,
    pub asr_api_key: String,
    pub emotion_provider: Option<String>,
    pub emotion_api_key: String,
    pub health_port: u16,
    /// How long in-flight work may finish after a shutdown signal before
    /// the consumer task is force-cancelled.
    pub shutdown_grace: Duration,
    pub log_json: bool,
}

impl WorkerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build the configuration from any name-to-value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| -> Result<String> {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| PipelineError::config(format!("{name} is required")))
        };
        let or_default = |name: &str, default: &str| -> String {
            lookup(name).filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
        };
        let parse_u64 = |name: &str, default: u64| -> Result<u64> {
            match lookup(name).filter(|v| !v.is_empty()) {
                None => Ok(default),
                Some(value) => value
                    .parse()
                    .map_err(|_| PipelineError::config(format!("{name} must be an integer, got '{value}'"))),
            }
        };

        let visibility_timeout_secs =
            parse_u64("VISIBILITY_TIMEOUT_SECONDS", DEFAULT_VISIBILITY_TIMEOUT_SECS)?;
        if visibility_timeout_secs < MIN_VISIBILITY_TIMEOUT_SECS {
            return Err(PipelineError::config(format!(
                "VISIBILITY_TIMEOUT_SECONDS must be at least {MIN_VISIBILITY_TIMEOUT_SECS}, got {visibility_timeout_secs}"
            )));
        }

        let emotion_provider = lookup("EMOTION_PROVIDER").filter(|v| !v.is_empty());

        Ok(Self {
            queue_api_url: required("QUEUE_API_URL")?,
            priority_queue_id: required("QUEUE_ID_PRIORITY")?,
            normal_queue_id: required("QUEUE_ID_NORMAL")?,
            queue_api_token: or_default("QUEUE_API_TOKEN", ""),
            poll_interval: Duration::from_secs(parse_u64(
                "POLL_INTERVAL_SECONDS",
                DEFAULT_POLL_INTERVAL_SECS,
            )?),
            batch_size: parse_u64("PULL_BATCH_SIZE", DEFAULT_BATCH_SIZE as u64)? as usize,
            visibility_timeout: Duration::from_secs(visibility_timeout_secs),
            blob_base_url: required("BLOB_API_URL")?,
            blob_bucket: required("BLOB_BUCKET")?,
            blob_token: or_default("BLOB_API_TOKEN", ""),
            status_store_url: required("STATUS_STORE_URL")?,
            status_store_secret: required("STATUS_STORE_SECRET")?,
            transcoder_provider: or_default("TRANSCODER_PROVIDER", "ffmpeg"),
            vad_provider: or_default("VAD_PROVIDER", "energy"),
            denoise_provider: or_default("DENOISE_PROVIDER", "null"),
            asr_provider: or_default("ASR_PROVIDER", "speechmatics"),
            asr_api_key: or_default("ASR_API_KEY", ""),
            emotion_provider,
            emotion_api_key: or_default("EMOTION_API_KEY", ""),
            health_port: parse_u64("HEALTH_PORT", DEFAULT_HEALTH_PORT as u64)? as u16,
            shutdown_grace: Duration::from_secs(parse_u64(
                "SHUTDOWN_GRACE_SECONDS",
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?),
            log_json: lookup("LOG_FORMAT").as_deref() == Some("json"),
        })
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            priority_queue_id: self.priority_queue_id.clone(),
            normal_queue_id: self.normal_queue_id.clone(),
            poll_interval: self.poll_interval,
            batch_size: self.batch_size,
            visibility_timeout: self.visibility_timeout,
        }
    }
}
