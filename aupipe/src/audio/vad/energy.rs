//! Frame-energy voice activity detection.
//!
//! Classifies fixed-size frames by normalized RMS level, concatenates speech
//! frames into a speech-only WAV, and reports contiguous speech segments.
//! A trailing partial frame is ignored.

use std::path::Path;

use crate::audio::wav;
use crate::error::{PipelineError, Result};

use super::{SpeechSegment, VadEngine, VadResult};

const DEFAULT_FRAME_LENGTH: usize = 512;
const DEFAULT_THRESHOLD: f32 = 0.015;

pub struct EnergyVad {
    /// Samples per analysis frame.
    pub frame_length: usize,
    /// Normalized RMS level (0.0 to 1.0) at or above which a frame counts
    /// as speech.
    pub threshold: f32,
}

impl Default for EnergyVad {
    fn default() -> Self {
        Self {
            frame_length: DEFAULT_FRAME_LENGTH,
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl EnergyVad {
    pub fn with_threshold(threshold: f32) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    fn rms(frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let sum_squares: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
        ((sum_squares / frame.len() as f64).sqrt() / i16::MAX as f64) as f32
    }

    fn segment(start_sample: usize, end_sample: usize) -> SpeechSegment {
        SpeechSegment {
            start_sample,
            end_sample,
            start_seconds: start_sample as f64 / wav::SAMPLE_RATE as f64,
            end_seconds: end_sample as f64 / wav::SAMPLE_RATE as f64,
        }
    }
}

impl VadEngine for EnergyVad {
    fn process(&self, input_path: &Path, output_dir: &Path) -> Result<VadResult> {
        let samples = wav::read_samples(input_path)
            .map_err(|e| PipelineError::vad(format!("failed to read {}: {e}", input_path.display())))?;
        let total_samples = samples.len();
        let total_duration = total_samples as f64 / wav::SAMPLE_RATE as f64;

        let mut speech_frames: Vec<i16> = Vec::new();
        let mut segments: Vec<SpeechSegment> = Vec::new();
        let mut in_speech = false;
        let mut segment_start = 0usize;

        let mut offset = 0usize;
        while offset + self.frame_length <= total_samples {
            let frame = &samples[offset..offset + self.frame_length];
            if Self::rms(frame) >= self.threshold {
                speech_frames.extend_from_slice(frame);
                if !in_speech {
                    in_speech = true;
                    segment_start = offset;
                }
            } else if in_speech {
                in_speech = false;
                segments.push(Self::segment(segment_start, offset));
            }
            offset += self.frame_length;
        }
        if in_speech {
            segments.push(Self::segment(segment_start, offset));
        }

        std::fs::create_dir_all(output_dir)?;
        let output_path = output_dir.join("speech.wav");
        wav::write_samples(&output_path, &speech_frames)
            .map_err(|e| PipelineError::vad(format!("failed to write speech output: {e}")))?;

        let speech_duration = speech_frames.len() as f64 / wav::SAMPLE_RATE as f64;
        let speech_ratio = if total_duration > 0.0 {
            speech_duration / total_duration
        } else {
            0.0
        };

        Ok(VadResult {
            segments,
            total_duration_seconds: total_duration,
            speech_duration_seconds: speech_duration,
            speech_ratio,
            output_path,
        })
    }
}
