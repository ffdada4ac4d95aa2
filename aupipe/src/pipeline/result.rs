//! Terminal result types for one batch run.

use std::collections::BTreeMap;

use crate::error::ErrorKind;
use crate::storage::status::BatchStatus;
use crate::timing::{Stage, StageTimings};

/// Kinds of artifacts a batch run can produce in the blob store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ArtifactKind {
    RawAudio,
    CleanedAudio,
    TranscriptFormatted,
    TranscriptRaw,
    TranscriptEmotion,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RawAudio => "raw_audio",
            Self::CleanedAudio => "cleaned_audio",
            Self::TranscriptFormatted => "transcript_formatted",
            Self::TranscriptRaw => "transcript_raw",
            Self::TranscriptEmotion => "transcript_emotion",
        }
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Artifact kind to blob-store key.
pub type ArtifactPaths = BTreeMap<ArtifactKind, String>;

/// String-keyed view for events and status rows.
pub fn artifact_strings(paths: &ArtifactPaths) -> BTreeMap<String, String> {
    paths
        .iter()
        .map(|(kind, key)| (kind.as_str().to_string(), key.clone()))
        .collect()
}

/// Details about a processing failure.
#[derive(Debug, Clone)]
pub struct ProcessingError {
    pub stage: Stage,
    pub message: String,
    pub kind: ErrorKind,
}

/// Metrics aggregated during one batch run.
#[derive(Debug, Clone, Default)]
pub struct ProcessingMetrics {
    pub raw_audio_duration_seconds: f64,
    pub speech_duration_seconds: f64,
    pub speech_ratio: f64,
    pub raw_audio_size_bytes: u64,
    pub cleaned_audio_size_bytes: u64,
    pub asr_job_id: String,
    pub asr_cost_estimate: f64,
    pub processing_wall_time_seconds: f64,
    pub stage_timings: StageTimings,
}

/// The single terminal result of one orchestrator invocation.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub status: BatchStatus,
    pub batch_id: String,
    pub artifact_paths: ArtifactPaths,
    pub metrics: ProcessingMetrics,
    pub error: Option<ProcessingError>,
}
