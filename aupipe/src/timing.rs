//! Per-stage timing collection for pipeline runs.
//!
//! Timings are recorded on both exits of a stage: a failing stage keeps its
//! own entry with a `Failed` outcome so failure attribution survives error
//! propagation. Entries are append-only for the life of a run.

use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::Result;

/// The timed pipeline stages, in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Fetch,
    Transcode,
    Vad,
    Denoise,
    Asr,
    Postprocess,
    Emotion,
    Store,
}

impl Stage {
    /// Execution order, used for failure attribution.
    pub const ORDER: [Stage; 8] = [
        Stage::Fetch,
        Stage::Transcode,
        Stage::Vad,
        Stage::Denoise,
        Stage::Asr,
        Stage::Postprocess,
        Stage::Emotion,
        Stage::Store,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Transcode => "transcode",
            Self::Vad => "vad",
            Self::Denoise => "denoise",
            Self::Asr => "asr",
            Self::Postprocess => "postprocess",
            Self::Emotion => "emotion",
            Self::Store => "store",
        }
    }

    /// Canonical name used for persisted stage rows. The status store schema
    /// predates this worker and names two stages differently.
    pub fn row_name(&self) -> &'static str {
        match self {
            Self::Asr => "asr_submit",
            Self::Postprocess => "post_process",
            other => other.as_str(),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageOutcome {
    Ok,
    Failed,
}

/// A single recorded stage execution.
#[derive(Debug, Clone)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration: Duration,
    pub outcome: StageOutcome,
}

/// Append-only list of stage executions for one batch run.
#[derive(Debug, Clone, Default)]
pub struct StageTimings {
    entries: Vec<StageTiming>,
}

impl StageTimings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a stage future, recording elapsed monotonic time on both exits.
    /// Errors are re-propagated unchanged.
    pub async fn record<T, F>(&mut self, stage: Stage, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = fut.await;
        let duration = start.elapsed();
        let outcome = match &result {
            Ok(_) => StageOutcome::Ok,
            Err(_) => StageOutcome::Failed,
        };
        self.entries.push(StageTiming {
            stage,
            duration,
            outcome,
        });
        result
    }

    pub fn entries(&self) -> &[StageTiming] {
        &self.entries
    }

    pub fn contains(&self, stage: Stage) -> bool {
        self.entries.iter().any(|e| e.stage == stage)
    }

    /// Duration in seconds of the first entry for a stage.
    pub fn duration_of(&self, stage: Stage) -> Option<f64> {
        self.entries
            .iter()
            .find(|e| e.stage == stage)
            .map(|e| e.duration.as_secs_f64())
    }

    pub fn first_failed(&self) -> Option<Stage> {
        self.entries
            .iter()
            .find(|e| e.outcome == StageOutcome::Failed)
            .map(|e| e.stage)
    }

    /// Attribute a failure to a stage: the stage that recorded a failed
    /// entry, otherwise the first ordered stage that never ran.
    pub fn failing_stage(&self) -> Stage {
        if let Some(stage) = self.first_failed() {
            return stage;
        }
        Stage::ORDER
            .iter()
            .copied()
            .find(|s| !self.contains(*s))
            .unwrap_or(Stage::Store)
    }
}
