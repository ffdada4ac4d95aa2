//! Batch pipeline orchestrator.
//!
//! Drives one recording through the ordered stages (fetch, transcode, vad,
//! denoise, asr, postprocess, emotion, store) and always lands in exactly
//! one terminal state: metrics, per-stage rows, and a completion event are
//! persisted for success and failure alike, and `process_batch` never
//! returns an error to its caller.

pub mod result;

pub use result::{
    ArtifactKind, ArtifactPaths, ProcessingError, ProcessingMetrics, ProcessingResult,
    artifact_strings,
};

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use chrono::{NaiveDateTime, Utc};
use tracing::{error, info};

use crate::asr::postprocess::insert_timestamp_markers;
use crate::asr::{SpeechRecognizer, Transcript, TranscriptionMetadata};
use crate::audio::denoise::DenoiseEngine;
use crate::audio::transcode::Transcoder;
use crate::audio::vad::VadEngine;
use crate::emotion::{EmotionEngine, run_emotion_analysis};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::metrics::{BatchMetrics, log_batch_metrics};
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::storage::blob::BlobStore;
use crate::storage::status::{
    BatchStatus, CompletionEvent, StageRow, StatusStore, StatusUpdate,
};
use crate::timing::{Stage, StageOutcome, StageTimings};

/// Vendor list price per second of speech audio (USD 0.24 per hour).
pub const ASR_COST_PER_SECOND: f64 = 0.24 / 3600.0;

/// Per-stage retry policies.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub fetch_retry: RetryPolicy,
    pub asr_retry: RetryPolicy,
    pub store_retry: RetryPolicy,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let transient = [ErrorKind::Network];
        Self {
            fetch_retry: RetryPolicy::new(3, Duration::from_secs(1)).transient_on(&transient),
            asr_retry: RetryPolicy::new(3, Duration::from_secs(2)).transient_on(&transient),
            store_retry: RetryPolicy::new(3, Duration::from_secs(1)).transient_on(&transient),
        }
    }
}

/// Parse the UTC creation timestamp embedded in a batch id
/// (`YYYYMMDDHHMMSS-GMT-<uuid>`) as an RFC 3339 string. A malformed id
/// degrades to an empty string rather than failing the batch.
pub fn recording_started_at(batch_id: &str) -> String {
    let Some((timestamp, rest)) = batch_id.split_once("-GMT-") else {
        return String::new();
    };
    if rest.is_empty() {
        return String::new();
    }
    match NaiveDateTime::parse_from_str(timestamp, "%Y%m%d%H%M%S") {
        Ok(parsed) => parsed.and_utc().to_rfc3339(),
        Err(_) => String::new(),
    }
}

/// Metric values accumulated as stages complete, so a mid-pipeline failure
/// still reports everything gathered up to that point.
#[derive(Debug, Clone, Default)]
struct StageData {
    raw_audio_size_bytes: u64,
    raw_audio_duration_seconds: f64,
    speech_duration_seconds: f64,
    speech_ratio: f64,
    cleaned_audio_size_bytes: u64,
    asr_job_id: String,
    asr_cost_estimate: f64,
}

pub struct Pipeline {
    blob_store: Arc<dyn BlobStore>,
    status_store: Arc<dyn StatusStore>,
    transcoder: Arc<dyn Transcoder>,
    vad: Arc<dyn VadEngine>,
    denoiser: Arc<dyn DenoiseEngine>,
    recognizer: Arc<dyn SpeechRecognizer>,
    emotion: Option<Arc<dyn EmotionEngine>>,
    settings: PipelineSettings,
}

impl Pipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        blob_store: Arc<dyn BlobStore>,
        status_store: Arc<dyn StatusStore>,
        transcoder: Arc<dyn Transcoder>,
        vad: Arc<dyn VadEngine>,
        denoiser: Arc<dyn DenoiseEngine>,
        recognizer: Arc<dyn SpeechRecognizer>,
        emotion: Option<Arc<dyn EmotionEngine>>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            blob_store,
            status_store,
            transcoder,
            vad,
            denoiser,
            recognizer,
            emotion,
            settings,
        }
    }

    fn raw_audio_key(user_id: &str, batch_id: &str) -> String {
        format!("{user_id}/{batch_id}/raw-audio/recording.m4a")
    }

    /// Process one batch end to end. Always returns a terminal result;
    /// every failure is durably recorded before this returns.
    pub async fn process_batch(
        &self,
        batch_id: &str,
        user_id: &str,
        queue_wait_seconds: f64,
    ) -> ProcessingResult {
        let started = Instant::now();
        let mut timings = StageTimings::new();
        let mut artifacts = ArtifactPaths::new();
        let mut data = StageData::default();

        // The raw-audio key is present from the start and never removed,
        // so a failed batch can always be reprocessed from the original.
        artifacts.insert(
            ArtifactKind::RawAudio,
            Self::raw_audio_key(user_id, batch_id),
        );

        let outcome = self
            .run_stages(batch_id, user_id, &mut timings, &mut artifacts, &mut data)
            .await;
        let wall_time = started.elapsed().as_secs_f64();

        match outcome {
            Ok(()) => {
                match self
                    .finalize_success(
                        batch_id,
                        user_id,
                        queue_wait_seconds,
                        wall_time,
                        &timings,
                        &artifacts,
                        &data,
                    )
                    .await
                {
                    Ok(result) => result,
                    Err(err) => {
                        self.finalize_failure(
                            batch_id,
                            user_id,
                            queue_wait_seconds,
                            started.elapsed().as_secs_f64(),
                            timings,
                            artifacts,
                            data,
                            err,
                        )
                        .await
                    }
                }
            }
            Err(err) => {
                self.finalize_failure(
                    batch_id,
                    user_id,
                    queue_wait_seconds,
                    wall_time,
                    timings,
                    artifacts,
                    data,
                    err,
                )
                .await
            }
        }
    }

    async fn run_stages(
        &self,
        batch_id: &str,
        user_id: &str,
        timings: &mut StageTimings,
        artifacts: &mut ArtifactPaths,
        data: &mut StageData,
    ) -> Result<()> {
        // Scoped working area, released unconditionally when this returns.
        let workdir = tempfile::tempdir()?;

        // fetch
        let raw_key = Self::raw_audio_key(user_id, batch_id);
        let raw_bytes = timings
            .record(Stage::Fetch, async {
                let blob = self.blob_store.clone();
                let key = raw_key.clone();
                retry_with_backoff(&self.settings.fetch_retry, "blob fetch", move |_| {
                    let blob = blob.clone();
                    let key = key.clone();
                    async move { blob.fetch(&key).await }
                })
                .await
            })
            .await?;
        data.raw_audio_size_bytes = raw_bytes.len() as u64;

        let raw_path = workdir.path().join("recording.m4a");
        tokio::fs::write(&raw_path, &raw_bytes).await?;
        drop(raw_bytes);

        // transcode: deterministic failures, never retried
        let transcode = timings
            .record(Stage::Transcode, {
                let transcoder = self.transcoder.clone();
                let input = raw_path.clone();
                let out_dir = workdir.path().join("transcoded");
                async move { transcoder.transcode(&input, &out_dir).await }
            })
            .await?;
        data.raw_audio_duration_seconds = transcode.duration_seconds;

        // vad
        let vad_result = timings
            .record(Stage::Vad, {
                let vad = self.vad.clone();
                let input = transcode.output_path.clone();
                let out_dir = workdir.path().join("vad");
                async move {
                    tokio::task::spawn_blocking(move || vad.process(&input, &out_dir))
                        .await
                        .map_err(|e| PipelineError::internal(format!("vad task failed: {e}")))?
                }
            })
            .await?;
        data.speech_duration_seconds = vad_result.speech_duration_seconds;
        data.speech_ratio = vad_result.speech_ratio;

        if !vad_result.has_speech() {
            // Zero-speech shortcut: no denoise, no recognition, no emotion.
            // An empty transcript artifact is still stored so consumers can
            // distinguish "no speech" from "not processed".
            info!(batch_id, "no speech detected, taking zero-speech path");
            let formatted_key = format!("{user_id}/{batch_id}/transcripts/formatted.txt");
            timings
                .record(Stage::Store, async {
                    self.put_artifact(&formatted_key, Bytes::new(), "text/plain")
                        .await
                })
                .await?;
            artifacts.insert(ArtifactKind::TranscriptFormatted, formatted_key);
            return Ok(());
        }

        // denoise
        let denoise_result = timings
            .record(Stage::Denoise, {
                let denoiser = self.denoiser.clone();
                let input = vad_result.output_path.clone();
                let out_dir = workdir.path().join("denoised");
                async move {
                    tokio::task::spawn_blocking(move || denoiser.process(&input, &out_dir))
                        .await
                        .map_err(|e| PipelineError::internal(format!("denoise task failed: {e}")))?
                }
            })
            .await?;
        data.cleaned_audio_size_bytes = denoise_result.output_size_bytes;

        // asr
        let metadata = TranscriptionMetadata {
            batch_id: batch_id.to_string(),
            language: None,
        };
        let transcript: Transcript = timings
            .record(Stage::Asr, async {
                let recognizer = self.recognizer.clone();
                let audio_path = denoise_result.output_path.clone();
                let metadata = metadata.clone();
                retry_with_backoff(&self.settings.asr_retry, "speech recognition", move |_| {
                    let recognizer = recognizer.clone();
                    let audio_path = audio_path.clone();
                    let metadata = metadata.clone();
                    async move { recognizer.transcribe(&audio_path, &metadata).await }
                })
                .await
            })
            .await?;
        data.asr_job_id = transcript.job_id();
        data.asr_cost_estimate = vad_result.speech_duration_seconds * ASR_COST_PER_SECOND;

        // postprocess
        let formatted = timings
            .record(Stage::Postprocess, async {
                Ok(insert_timestamp_markers(&transcript))
            })
            .await?;

        // emotion, best-effort: the runner converts failures to None
        let emotion_result = timings
            .record(Stage::Emotion, async {
                Ok(run_emotion_analysis(
                    self.emotion.as_ref(),
                    &transcript,
                    Some(&denoise_result.output_path),
                    batch_id,
                )
                .await)
            })
            .await?;

        // store
        let cleaned_key = format!("{user_id}/{batch_id}/cleaned-audio/cleaned.wav");
        let formatted_key = format!("{user_id}/{batch_id}/transcripts/formatted.txt");
        let raw_json_key = format!("{user_id}/{batch_id}/transcripts/raw.json");
        let emotion_key = format!("{user_id}/{batch_id}/transcripts/emotion.json");
        timings
            .record(Stage::Store, async {
                let cleaned_bytes = tokio::fs::read(&denoise_result.output_path).await?;
                self.put_artifact(&cleaned_key, cleaned_bytes.into(), "audio/wav")
                    .await?;
                artifacts.insert(ArtifactKind::CleanedAudio, cleaned_key.clone());

                self.put_artifact(
                    &formatted_key,
                    Bytes::from(formatted.clone().into_bytes()),
                    "text/plain",
                )
                .await?;
                artifacts.insert(ArtifactKind::TranscriptFormatted, formatted_key.clone());

                let raw_json = serde_json::to_vec(&transcript.raw_response)
                    .map_err(|e| PipelineError::storage("put_object", e.to_string()))?;
                self.put_artifact(&raw_json_key, raw_json.into(), "application/json")
                    .await?;
                artifacts.insert(ArtifactKind::TranscriptRaw, raw_json_key.clone());

                if let Some(emotion) = &emotion_result {
                    let emotion_json = serde_json::to_vec(emotion)
                        .map_err(|e| PipelineError::storage("put_object", e.to_string()))?;
                    self.put_artifact(&emotion_key, emotion_json.into(), "application/json")
                        .await?;
                    artifacts.insert(ArtifactKind::TranscriptEmotion, emotion_key.clone());
                }
                Ok(())
            })
            .await?;

        Ok(())
    }

    async fn put_artifact(&self, key: &str, bytes: Bytes, content_type: &'static str) -> Result<()> {
        let blob = self.blob_store.clone();
        let key = key.to_string();
        retry_with_backoff(&self.settings.store_retry, "blob put", move |_| {
            let blob = blob.clone();
            let key = key.clone();
            let bytes = bytes.clone();
            async move { blob.put(&key, bytes, content_type).await }
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn finalize_success(
        &self,
        batch_id: &str,
        user_id: &str,
        queue_wait_seconds: f64,
        wall_time: f64,
        timings: &StageTimings,
        artifacts: &ArtifactPaths,
        data: &StageData,
    ) -> Result<ProcessingResult> {
        let metrics = build_batch_metrics(
            batch_id,
            user_id,
            BatchStatus::Completed,
            queue_wait_seconds,
            wall_time,
            timings,
            data,
            None,
        );

        self.status_store.update_metrics(&metrics).await?;
        self.status_store
            .insert_stage_rows(batch_id, &build_stage_rows(timings, None))
            .await?;
        self.status_store
            .publish_completion_event(&build_completion_event(
                batch_id,
                user_id,
                BatchStatus::Completed,
                artifacts,
                None,
            ))
            .await?;

        log_batch_metrics(&metrics);
        info!(batch_id, wall_time_seconds = wall_time, "batch processing completed");

        Ok(ProcessingResult {
            status: BatchStatus::Completed,
            batch_id: batch_id.to_string(),
            artifact_paths: artifacts.clone(),
            metrics: processing_metrics(data, wall_time, timings.clone()),
            error: None,
        })
    }

    /// Best-effort terminal bookkeeping for a failed batch. Secondary
    /// failures are logged and never mask the original error or escape.
    #[allow(clippy::too_many_arguments)]
    async fn finalize_failure(
        &self,
        batch_id: &str,
        user_id: &str,
        queue_wait_seconds: f64,
        wall_time: f64,
        timings: StageTimings,
        artifacts: ArtifactPaths,
        data: StageData,
        err: PipelineError,
    ) -> ProcessingResult {
        let stage = timings.failing_stage();
        let message = err.to_string();
        let retry_count = err.attempts().unwrap_or(0);
        error!(batch_id, stage = %stage, error = %message, "batch processing failed");

        let update = StatusUpdate {
            error_stage: Some(stage.as_str().to_string()),
            error_message: Some(message.clone()),
            retry_count: Some(retry_count),
            artifact_paths: Some(artifact_strings(&artifacts)),
            ..StatusUpdate::new(batch_id, BatchStatus::Failed)
        };
        if let Err(e) = self.status_store.update_status(&update).await {
            error!(batch_id, error = %e, "failed to persist failure status");
        }

        let rows = build_stage_rows(&timings, Some(&message));
        if let Err(e) = self.status_store.insert_stage_rows(batch_id, &rows).await {
            error!(batch_id, error = %e, "failed to persist stage rows");
        }

        let event = build_completion_event(
            batch_id,
            user_id,
            BatchStatus::Failed,
            &artifacts,
            Some(message.clone()),
        );
        if let Err(e) = self.status_store.publish_completion_event(&event).await {
            error!(batch_id, error = %e, "failed to publish failure event");
        }

        let metrics = build_batch_metrics(
            batch_id,
            user_id,
            BatchStatus::Failed,
            queue_wait_seconds,
            wall_time,
            &timings,
            &data,
            Some((stage, &message, retry_count)),
        );
        log_batch_metrics(&metrics);

        ProcessingResult {
            status: BatchStatus::Failed,
            batch_id: batch_id.to_string(),
            artifact_paths: artifacts,
            metrics: processing_metrics(&data, wall_time, timings),
            error: Some(ProcessingError {
                stage,
                message,
                kind: err.kind(),
            }),
        }
    }
}

/// Map recorded timings onto persisted stage rows, with the failed stage
/// carrying the error message.
fn build_stage_rows(timings: &StageTimings, error_message: Option<&str>) -> Vec<StageRow> {
    timings
        .entries()
        .iter()
        .map(|entry| {
            let failed = entry.outcome == StageOutcome::Failed;
            StageRow {
                stage: entry.stage.row_name().to_string(),
                duration_seconds: entry.duration.as_secs_f64(),
                success: !failed,
                error_message: if failed {
                    error_message.map(ToString::to_string)
                } else {
                    None
                },
            }
        })
        .collect()
}

fn build_completion_event(
    batch_id: &str,
    user_id: &str,
    status: BatchStatus,
    artifacts: &ArtifactPaths,
    error_message: Option<String>,
) -> CompletionEvent {
    CompletionEvent {
        batch_id: batch_id.to_string(),
        user_id: user_id.to_string(),
        status,
        recording_started_at: recording_started_at(batch_id),
        artifact_paths: artifact_strings(artifacts),
        published_at: Utc::now().to_rfc3339(),
        error_message,
    }
}

#[allow(clippy::too_many_arguments)]
fn build_batch_metrics(
    batch_id: &str,
    user_id: &str,
    status: BatchStatus,
    queue_wait_seconds: f64,
    wall_time: f64,
    timings: &StageTimings,
    data: &StageData,
    error: Option<(Stage, &str, u32)>,
) -> BatchMetrics {
    BatchMetrics {
        batch_id: batch_id.to_string(),
        user_id: user_id.to_string(),
        status: status.as_str().to_string(),
        raw_audio_duration_seconds: data.raw_audio_duration_seconds,
        speech_duration_seconds: data.speech_duration_seconds,
        speech_ratio: data.speech_ratio,
        processing_wall_time_seconds: wall_time,
        queue_wait_time_seconds: queue_wait_seconds,
        raw_audio_size_bytes: data.raw_audio_size_bytes,
        cleaned_audio_size_bytes: data.cleaned_audio_size_bytes,
        asr_job_id: data.asr_job_id.clone(),
        asr_cost_estimate: data.asr_cost_estimate,
        transcode_duration_seconds: timings.duration_of(Stage::Transcode).unwrap_or(0.0),
        vad_duration_seconds: timings.duration_of(Stage::Vad).unwrap_or(0.0),
        denoise_duration_seconds: timings.duration_of(Stage::Denoise).unwrap_or(0.0),
        asr_submit_duration_seconds: timings.duration_of(Stage::Asr).unwrap_or(0.0),
        asr_wait_duration_seconds: 0.0,
        post_process_duration_seconds: timings.duration_of(Stage::Postprocess).unwrap_or(0.0),
        retry_count: error.map(|(_, _, attempts)| attempts).unwrap_or(0),
        error_stage: error.map(|(stage, _, _)| stage.as_str().to_string()),
        error_message: error.map(|(_, message, _)| message.to_string()),
    }
}

fn processing_metrics(data: &StageData, wall_time: f64, timings: StageTimings) -> ProcessingMetrics {
    ProcessingMetrics {
        raw_audio_duration_seconds: data.raw_audio_duration_seconds,
        speech_duration_seconds: data.speech_duration_seconds,
        speech_ratio: data.speech_ratio,
        raw_audio_size_bytes: data.raw_audio_size_bytes,
        cleaned_audio_size_bytes: data.cleaned_audio_size_bytes,
        asr_job_id: data.asr_job_id.clone(),
        asr_cost_estimate: data.asr_cost_estimate,
        processing_wall_time_seconds: wall_time,
        stage_timings: timings,
    }
}
