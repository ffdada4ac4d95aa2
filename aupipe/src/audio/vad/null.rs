//! Passthrough VAD that treats the entire recording as speech.
//!
//! Used when detection is disabled; some downstream recognizers do their own
//! audio filtering and prefer the full signal.

use std::path::Path;

use crate::audio::wav;
use crate::error::{PipelineError, Result};

use super::{SpeechSegment, VadEngine, VadResult};

pub struct NullVad;

impl VadEngine for NullVad {
    fn process(&self, input_path: &Path, output_dir: &Path) -> Result<VadResult> {
        let samples = wav::read_samples(input_path)
            .map_err(|e| PipelineError::vad(format!("failed to read {}: {e}", input_path.display())))?;
        let total_samples = samples.len();
        let total_duration = total_samples as f64 / wav::SAMPLE_RATE as f64;

        std::fs::create_dir_all(output_dir)?;
        let output_path = output_dir.join("speech.wav");
        std::fs::copy(input_path, &output_path)?;

        if total_samples == 0 {
            return Ok(VadResult {
                segments: vec![],
                total_duration_seconds: 0.0,
                speech_duration_seconds: 0.0,
                speech_ratio: 0.0,
                output_path,
            });
        }

        Ok(VadResult {
            segments: vec![SpeechSegment {
                start_sample: 0,
                end_sample: total_samples,
                start_seconds: 0.0,
                end_seconds: total_duration,
            }],
            total_duration_seconds: total_duration,
            speech_duration_seconds: total_duration,
            speech_ratio: 1.0,
            output_path,
        })
    }
}
