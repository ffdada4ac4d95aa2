//! Passthrough denoiser that copies audio unchanged.
//!
//! Aggressive suppression measurably degrades recognition accuracy, and the
//! default recognizer applies its own audio filtering, so the passthrough is
//! the production default.

use std::path::Path;

use crate::error::Result;

use super::{DenoiseEngine, DenoiseResult};

pub struct NullDenoise;

impl DenoiseEngine for NullDenoise {
    fn process(&self, input_path: &Path, output_dir: &Path) -> Result<DenoiseResult> {
        let input_size_bytes = std::fs::metadata(input_path)?.len();

        std::fs::create_dir_all(output_dir)?;
        let output_path = output_dir.join("denoised.wav");
        std::fs::copy(input_path, &output_path)?;

        let output_size_bytes = std::fs::metadata(&output_path)?.len();

        Ok(DenoiseResult {
            input_size_bytes,
            output_size_bytes,
            output_path,
        })
    }
}
