//! Batch-level observability metrics.
//!
//! One flat record is emitted per terminal state (completed or failed) as a
//! single structured tracing event, ready for JSON log ingestion.

use serde::Serialize;
use tracing::info;

/// All metrics collected for a single batch processing run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchMetrics {
    pub batch_id: String,
    pub user_id: String,
    pub status: String,
    pub raw_audio_duration_seconds: f64,
    pub speech_duration_seconds: f64,
    pub speech_ratio: f64,
    pub processing_wall_time_seconds: f64,
    pub queue_wait_time_seconds: f64,
    pub raw_audio_size_bytes: u64,
    pub cleaned_audio_size_bytes: u64,
    pub asr_job_id: String,
    pub asr_cost_estimate: f64,
    pub transcode_duration_seconds: f64,
    pub vad_duration_seconds: f64,
    pub denoise_duration_seconds: f64,
    pub asr_submit_duration_seconds: f64,
    pub asr_wait_duration_seconds: f64,
    pub post_process_duration_seconds: f64,
    pub retry_count: u32,
    pub error_stage: Option<String>,
    pub error_message: Option<String>,
}

/// Emit the metrics record as one flat structured event.
pub fn log_batch_metrics(metrics: &BatchMetrics) {
    info!(
        target: "aupipe::metrics",
        metric_type = "batch_completion",
        batch_id = %metrics.batch_id,
        user_id = %metrics.user_id,
        status = %metrics.status,
        raw_audio_duration_seconds = metrics.raw_audio_duration_seconds,
        speech_duration_seconds = metrics.speech_duration_seconds,
        speech_ratio = metrics.speech_ratio,
        processing_wall_time_seconds = metrics.processing_wall_time_seconds,
        queue_wait_time_seconds = metrics.queue_wait_time_seconds,
        raw_audio_size_bytes = metrics.raw_audio_size_bytes,
        cleaned_audio_size_bytes = metrics.cleaned_audio_size_bytes,
        asr_job_id = %metrics.asr_job_id,
        asr_cost_estimate = metrics.asr_cost_estimate,
        transcode_duration_seconds = metrics.transcode_duration_seconds,
        vad_duration_seconds = metrics.vad_duration_seconds,
        denoise_duration_seconds = metrics.denoise_duration_seconds,
        asr_submit_duration_seconds = metrics.asr_submit_duration_seconds,
        asr_wait_duration_seconds = metrics.asr_wait_duration_seconds,
        post_process_duration_seconds = metrics.post_process_duration_seconds,
        retry_count = metrics.retry_count,
        error_stage = metrics.error_stage.as_deref().unwrap_or(""),
        error_message = metrics.error_message.as_deref().unwrap_or(""),
        "batch metrics"
    );
}
