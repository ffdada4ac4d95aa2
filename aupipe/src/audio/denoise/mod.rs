//! Noise suppression engines.

pub mod null;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{PipelineError, Result};

/// Result of noise suppression processing.
#[derive(Debug, Clone)]
pub struct DenoiseResult {
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
    pub output_path: PathBuf,
}

/// Noise suppression over a canonical-format WAV file.
///
/// Implementations are CPU/file bound; the pipeline runs them under a
/// blocking task.
pub trait DenoiseEngine: Send + Sync {
    fn process(&self, input_path: &Path, output_dir: &Path) -> Result<DenoiseResult>;
}

/// Create a denoise engine by provider name.
pub fn create_denoise_engine(provider: &str) -> Result<Arc<dyn DenoiseEngine>> {
    match provider {
        "null" => Ok(Arc::new(null::NullDenoise)),
        other => Err(PipelineError::config(format!(
            "unknown denoise provider '{other}', available: null"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_rejects_unknown_provider() {
        let err = match create_denoise_engine("rnnoise") {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        let msg = err.to_string();
        assert!(msg.contains("unknown denoise provider 'rnnoise'"));
        assert!(msg.contains("available: null"));
    }
}
