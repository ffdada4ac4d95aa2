//! Transcoding to the canonical pipeline format via ffmpeg.
//!
//! Transcode failures are deterministic (corrupt input, unsupported codec)
//! and are never retried by the pipeline.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::audio::wav;
use crate::error::{PipelineError, Result};

const FFPROBE_TIMEOUT: Duration = Duration::from_secs(10);
const FFMPEG_TIMEOUT: Duration = Duration::from_secs(120);

/// Result of a successful transcode operation.
#[derive(Debug, Clone)]
pub struct TranscodeResult {
    pub output_path: PathBuf,
    pub input_size_bytes: u64,
    pub output_size_bytes: u64,
    pub duration_seconds: f64,
}

/// Converts an uploaded recording into 16 kHz mono 16-bit PCM WAV.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, input_path: &Path, output_dir: &Path) -> Result<TranscodeResult>;
}

/// Create a transcoder by provider name.
pub fn create_transcoder(provider: &str) -> Result<std::sync::Arc<dyn Transcoder>> {
    match provider {
        "ffmpeg" => Ok(std::sync::Arc::new(FfmpegTranscoder::new())),
        other => Err(PipelineError::config(format!(
            "unknown transcoder provider '{other}', available: ffmpeg"
        ))),
    }
}

/// ffmpeg subprocess transcoder with an ffprobe pre-validation pass.
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
}

impl FfmpegTranscoder {
    pub fn new() -> Self {
        Self {
            ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
            ffprobe_path: std::env::var("FFPROBE_PATH").unwrap_or_else(|_| "ffprobe".to_string()),
        }
    }

    pub fn with_paths(ffmpeg_path: impl Into<String>, ffprobe_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Build ffmpeg arguments for conversion to the canonical format.
    pub fn build_args(&self, input_path: &Path, output_path: &Path) -> Vec<String> {
        vec![
            "-y".to_string(),
            "-hide_banner".to_string(),
            "-nostats".to_string(),
            "-loglevel".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input_path.to_string_lossy().to_string(),
            "-ar".to_string(),
            wav::SAMPLE_RATE.to_string(),
            "-ac".to_string(),
            wav::CHANNELS.to_string(),
            "-sample_fmt".to_string(),
            "s16".to_string(),
            "-f".to_string(),
            "wav".to_string(),
            output_path.to_string_lossy().to_string(),
        ]
    }

    /// Validate the input with ffprobe before transcoding, so corrupt files
    /// fail in seconds instead of waiting out the ffmpeg timeout. A missing
    /// ffprobe binary skips the pre-check and lets ffmpeg report the error.
    async fn probe_input(&self, input_path: &Path) -> Result<()> {
        let mut cmd = Command::new(&self.ffprobe_path);
        cmd.args(["-v", "error", "-show_format"])
            .arg(input_path)
            .kill_on_drop(true);

        let output = match tokio::time::timeout(FFPROBE_TIMEOUT, cmd.output()).await {
            Err(_) => {
                return Err(PipelineError::transcode(format!(
                    "ffprobe timed out after {}s, input may be corrupt: {}",
                    FFPROBE_TIMEOUT.as_secs(),
                    input_path.display()
                )));
            }
            Ok(Err(e)) => {
                warn!(error = %e, "ffprobe unavailable, skipping input pre-validation");
                return Ok(());
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::transcode(format!(
                "input is corrupt or unreadable (ffprobe): {}",
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, input_path: &Path, output_dir: &Path) -> Result<TranscodeResult> {
        let input_meta = tokio::fs::metadata(input_path).await.map_err(|e| {
            PipelineError::transcode(format!(
                "input file does not exist: {}: {e}",
                input_path.display()
            ))
        })?;

        self.probe_input(input_path).await?;

        tokio::fs::create_dir_all(output_dir).await?;
        let stem = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("recording");
        let output_path = output_dir.join(format!("{stem}.wav"));

        let args = self.build_args(input_path, &output_path);
        debug!(?args, "running ffmpeg");

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(&args).env("LC_ALL", "C").kill_on_drop(true);

        let output = match tokio::time::timeout(FFMPEG_TIMEOUT, cmd.output()).await {
            Err(_) => {
                return Err(PipelineError::transcode(format!(
                    "ffmpeg timed out after {}s",
                    FFMPEG_TIMEOUT.as_secs()
                )));
            }
            Ok(Err(e)) => {
                return Err(PipelineError::transcode(format!("failed to run ffmpeg: {e}")));
            }
            Ok(Ok(output)) => output,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipelineError::transcode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let output_meta = tokio::fs::metadata(&output_path).await.map_err(|_| {
            PipelineError::transcode(format!(
                "ffmpeg produced no output file: {}",
                output_path.display()
            ))
        })?;

        let duration_seconds = wav::duration_seconds(&output_path)
            .map_err(|e| PipelineError::transcode(format!("unreadable transcode output: {e}")))?;

        Ok(TranscodeResult {
            output_path,
            input_size_bytes: input_meta.len(),
            output_size_bytes: output_meta.len(),
            duration_seconds,
        })
    }
}
