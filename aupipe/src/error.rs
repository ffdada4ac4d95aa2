//! Pipeline-wide error types.

use thiserror::Error;

/// Result alias used throughout the worker.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error raised by any stage of the batch pipeline or its collaborators.
///
/// Wire-level conditions are mapped onto kinds by the HTTP clients:
/// transport failures, 5xx and 429 become [`PipelineError::Network`]
/// (eligible for retry at call sites that allow it), everything else maps to
/// the stage-specific variant and surfaces on first attempt.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to fetch object `{key}`: {reason}")]
    Fetch { key: String, reason: String },

    #[error("transcode failed: {reason}")]
    Transcode { reason: String },

    #[error("voice activity detection failed: {reason}")]
    Vad { reason: String },

    #[error("noise suppression failed: {reason}")]
    Denoise { reason: String },

    #[error("speech recognition failed ({provider}): {reason}")]
    Asr { provider: String, reason: String },

    #[error("storage operation `{operation}` failed: {reason}")]
    Storage {
        operation: &'static str,
        reason: String,
    },

    #[error("emotion analysis failed: {reason}")]
    EmotionAnalysis { reason: String },

    #[error("queue {operation} failed: {reason}")]
    Queue {
        operation: &'static str,
        reason: String,
    },

    #[error("invalid job descriptor: {reason}")]
    InvalidJob { reason: String },

    #[error("network error during {operation}: {reason}")]
    Network {
        operation: &'static str,
        reason: String,
    },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("{source} (attempts: {attempts})")]
    Retried {
        attempts: u32,
        source: Box<PipelineError>,
    },

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

/// Classification tag for [`PipelineError`] variants.
///
/// Retry allow-lists are expressed in terms of kinds, and the kind name is
/// what gets persisted as the exception-kind of a failed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Fetch,
    Transcode,
    Vad,
    Denoise,
    Asr,
    Storage,
    EmotionAnalysis,
    Queue,
    InvalidJob,
    Network,
    Configuration,
    Io,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Transcode => "transcode",
            Self::Vad => "vad",
            Self::Denoise => "denoise",
            Self::Asr => "asr",
            Self::Storage => "storage",
            Self::EmotionAnalysis => "emotion_analysis",
            Self::Queue => "queue",
            Self::InvalidJob => "invalid_job",
            Self::Network => "network",
            Self::Configuration => "configuration",
            Self::Io => "io",
            Self::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn fetch(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Fetch {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn transcode(reason: impl Into<String>) -> Self {
        Self::Transcode {
            reason: reason.into(),
        }
    }

    pub fn vad(reason: impl Into<String>) -> Self {
        Self::Vad {
            reason: reason.into(),
        }
    }

    pub fn denoise(reason: impl Into<String>) -> Self {
        Self::Denoise {
            reason: reason.into(),
        }
    }

    pub fn asr(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Asr {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    pub fn storage(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Storage {
            operation,
            reason: reason.into(),
        }
    }

    pub fn emotion(reason: impl Into<String>) -> Self {
        Self::EmotionAnalysis {
            reason: reason.into(),
        }
    }

    pub fn queue(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Queue {
            operation,
            reason: reason.into(),
        }
    }

    pub fn invalid_job(reason: impl Into<String>) -> Self {
        Self::InvalidJob {
            reason: reason.into(),
        }
    }

    pub fn network(operation: &'static str, reason: impl Into<String>) -> Self {
        Self::Network {
            operation,
            reason: reason.into(),
        }
    }

    pub fn config(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Wrap an error with the number of retry attempts already consumed.
    pub fn retried(attempts: u32, source: PipelineError) -> Self {
        Self::Retried {
            attempts,
            source: Box::new(source),
        }
    }

    /// Classification kind; a retried error reports the kind of its cause.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::Transcode { .. } => ErrorKind::Transcode,
            Self::Vad { .. } => ErrorKind::Vad,
            Self::Denoise { .. } => ErrorKind::Denoise,
            Self::Asr { .. } => ErrorKind::Asr,
            Self::Storage { .. } => ErrorKind::Storage,
            Self::EmotionAnalysis { .. } => ErrorKind::EmotionAnalysis,
            Self::Queue { .. } => ErrorKind::Queue,
            Self::InvalidJob { .. } => ErrorKind::InvalidJob,
            Self::Network { .. } => ErrorKind::Network,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Io { .. } => ErrorKind::Io,
            Self::Retried { source, .. } => source.kind(),
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Retry attempts consumed before this error propagated, if it went
    /// through the retry wrapper.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Retried { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }
}
