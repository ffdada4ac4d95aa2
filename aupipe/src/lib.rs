//! Queue-driven audio batch processing worker.
//!
//! The worker pulls jobs from two priority-ordered remote queues and drives
//! each recording through a fixed pipeline: fetch, transcode, voice activity
//! detection, denoise, speech recognition, transcript formatting, emotion
//! analysis, artifact storage, and terminal status/event publication.
//!
//! Every batch lands in exactly one terminal state. Failures are attributed
//! to their stage and durably recorded before the queue message is
//! acknowledged, so redelivery never repeats paid vendor calls.

pub mod asr;
pub mod audio;
pub mod config;
pub mod emotion;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod retry;
pub mod storage;
pub mod timing;

pub use error::{ErrorKind, PipelineError, Result};
