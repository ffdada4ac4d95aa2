//! Voice activity detection engines.
//!
//! Engines consume a canonical-format WAV, classify speech, and write a
//! speech-only WAV next to their segment report. The pipeline takes the
//! zero-speech shortcut when an engine reports no segments or zero speech
//! duration.

pub mod energy;
pub mod null;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PipelineError, Result};

/// A contiguous run of detected speech, with sample-level precision.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechSegment {
    pub start_sample: usize,
    pub end_sample: usize,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

/// Result of voice activity detection over one recording.
#[derive(Debug, Clone)]
pub struct VadResult {
    pub segments: Vec<SpeechSegment>,
    pub total_duration_seconds: f64,
    pub speech_duration_seconds: f64,
    pub speech_ratio: f64,
    pub output_path: PathBuf,
}

impl VadResult {
    /// Whether the pipeline should take the zero-speech shortcut.
    pub fn has_speech(&self) -> bool {
        !self.segments.is_empty() && self.speech_duration_seconds > 0.0
    }
}

/// Voice activity detection over a canonical-format WAV file.
///
/// Implementations are CPU/file bound; the pipeline runs them under a
/// blocking task.
pub trait VadEngine: Send + Sync {
    fn process(&self, input_path: &Path, output_dir: &Path) -> Result<VadResult>;
}

/// Create a VAD engine by provider name.
pub fn create_vad_engine(provider: &str) -> Result<Arc<dyn VadEngine>> {
    match provider {
        "energy" => Ok(Arc::new(energy::EnergyVad::default())),
        "null" => Ok(Arc::new(null::NullVad)),
        other => Err(PipelineError::config(format!(
            "unknown vad provider '{other}', available: energy, null"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_resolves_known_providers() {
        assert!(create_vad_engine("energy").is_ok());
        assert!(create_vad_engine("null").is_ok());
    }

    #[test]
    fn registry_rejects_unknown_provider() {
        let err = match create_vad_engine("silero") {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        let msg = err.to_string();
        assert!(msg.contains("unknown vad provider 'silero'"));
        assert!(msg.contains("available: energy, null"));
    }

    #[test]
    fn zero_speech_result_is_detected() {
        let result = VadResult {
            segments: vec![],
            total_duration_seconds: 2.0,
            speech_duration_seconds: 0.0,
            speech_ratio: 0.0,
            output_path: PathBuf::from("/tmp/speech.wav"),
        };
        assert!(!result.has_speech());
    }
}
