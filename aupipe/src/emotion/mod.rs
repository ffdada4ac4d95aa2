//! Emotion analysis: per-segment sentiment scoring, run best-effort.
//!
//! Failures here never fail a batch: the runner converts every error into an
//! absent result and the pipeline simply skips the emotion artifact.

pub mod google_nl;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::asr::{Transcript, TranscriptSegment};
use crate::error::{PipelineError, Result};

/// Sentiment analysis for one transcript segment.
#[derive(Debug, Clone, Serialize)]
pub struct EmotionSegment {
    pub segment_index: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
    pub speaker: String,
    pub text: String,
    pub analysis: Value,
}

/// Emotion artifact envelope, serialized as the `emotion.json` artifact.
#[derive(Debug, Clone, Serialize)]
pub struct EmotionResult {
    pub provider: String,
    pub provider_version: String,
    pub analyzed_at: String,
    pub batch_id: String,
    pub segments: Vec<EmotionSegment>,
}

/// Sentiment analysis over speaker-labeled transcript segments.
#[async_trait]
pub trait EmotionEngine: Send + Sync {
    fn provider_name(&self) -> &'static str;
    fn provider_version(&self) -> &'static str;

    async fn analyze(
        &self,
        segments: &[TranscriptSegment],
        audio_path: Option<&Path>,
    ) -> Result<EmotionResult>;
}

/// Create an emotion engine by provider name.
pub fn create_emotion_engine(provider: &str, api_key: &str) -> Result<Arc<dyn EmotionEngine>> {
    match provider {
        "google-cloud-nl" => Ok(Arc::new(google_nl::GoogleNlEngine::new(api_key)?)),
        other => Err(PipelineError::config(format!(
            "unknown emotion provider '{other}', available: google-cloud-nl"
        ))),
    }
}

/// Run emotion analysis best-effort.
///
/// `None` engine means the feature is disabled. An empty transcript yields
/// an empty envelope without calling the vendor. Any engine error is logged
/// and degrades to `None`.
pub async fn run_emotion_analysis(
    engine: Option<&Arc<dyn EmotionEngine>>,
    transcript: &Transcript,
    audio_path: Option<&Path>,
    batch_id: &str,
) -> Option<EmotionResult> {
    let engine = engine?;

    if transcript.segments.is_empty() {
        return Some(EmotionResult {
            provider: engine.provider_name().to_string(),
            provider_version: engine.provider_version().to_string(),
            analyzed_at: Utc::now().to_rfc3339(),
            batch_id: batch_id.to_string(),
            segments: vec![],
        });
    }

    match engine.analyze(&transcript.segments, audio_path).await {
        Ok(mut result) => {
            result.batch_id = batch_id.to_string();
            Some(result)
        }
        Err(e) => {
            error!(
                provider = engine.provider_name(),
                batch_id,
                error = %e,
                "emotion analysis failed"
            );
            None
        }
    }
}
