//! Speech recognition: transcript data model, recognizer interface, and
//! provider registry.

pub mod postprocess;
pub mod speechmatics;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{PipelineError, Result};

/// A single recognized word with timing and confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptWord {
    pub text: String,
    pub start_time: f64,
    pub end_time: f64,
    pub confidence: f64,
}

/// A run of consecutive words from a single speaker.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptSegment {
    pub speaker_label: String,
    pub words: Vec<TranscriptWord>,
}

/// Complete transcript with speaker-labeled segments and the unmodified
/// vendor response.
#[derive(Debug, Clone)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub raw_response: Value,
}

impl Transcript {
    /// Vendor job id, used for billing reconciliation. Empty when the
    /// response carries none.
    pub fn job_id(&self) -> String {
        self.raw_response["job"]["id"]
            .as_str()
            .unwrap_or_default()
            .to_string()
    }
}

/// Context forwarded to the recognizer alongside the audio.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionMetadata {
    pub batch_id: String,
    pub language: Option<String>,
}

/// Asynchronous speech-to-text over a speech-only WAV file.
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(
        &self,
        audio_path: &Path,
        metadata: &TranscriptionMetadata,
    ) -> Result<Transcript>;
}

/// Create a speech recognizer by provider name.
pub fn create_speech_recognizer(
    provider: &str,
    api_key: &str,
) -> Result<Arc<dyn SpeechRecognizer>> {
    match provider {
        "speechmatics" => Ok(Arc::new(speechmatics::SpeechmaticsRecognizer::new(
            api_key,
        )?)),
        other => Err(PipelineError::config(format!(
            "unknown asr provider '{other}', available: speechmatics"
        ))),
    }
}
