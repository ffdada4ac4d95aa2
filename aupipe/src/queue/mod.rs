//! Priority-aware queue consumer.
//!
//! Every poll cycle drains the priority queue before the normal queue,
//! validates each message into a job descriptor, marks the batch as
//! processing, dispatches it to the pipeline, and acknowledges the message.
//! Messages are acked even when dispatch fails: the orchestrator durably
//! records the failure itself, so redelivery would only duplicate costly
//! vendor calls. Only validation failures nack.

pub mod transport;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{PipelineError, Result};
use crate::storage::status::{BatchStatus, StatusStore, StatusUpdate};

use transport::{QueueMessage, QueueTransport};

/// Job priority, fixed by which queue the producer enqueued into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    Immediate,
    #[default]
    Normal,
}

impl Priority {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "immediate" => Some(Self::Immediate),
            "normal" => Some(Self::Normal),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::Normal => "normal",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated processing job deserialized from a queue message.
///
/// Created once at pull time and discarded after the dispatch decision.
#[derive(Debug, Clone)]
pub struct ProcessingJob {
    pub batch_id: String,
    pub user_id: String,
    pub priority: Priority,
    pub enqueued_at: Option<DateTime<FixedOffset>>,
}

impl ProcessingJob {
    /// Normalize and validate a queue message body.
    ///
    /// The body may arrive as a native JSON object or as a JSON-encoded
    /// string containing one; both forms validate identically.
    pub fn from_message_body(body: &Value) -> Result<Self> {
        let normalized;
        let body = match body {
            Value::String(embedded) => {
                normalized = serde_json::from_str::<Value>(embedded).map_err(|e| {
                    PipelineError::invalid_job(format!("body is not valid JSON: {e}"))
                })?;
                &normalized
            }
            other => other,
        };

        let batch_id = body["batch_id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::invalid_job("missing or invalid 'batch_id'"))?;

        let user_id = body["user_id"]
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| PipelineError::invalid_job("missing or invalid 'user_id'"))?;

        let priority = match body.get("priority") {
            None | Some(Value::Null) => Priority::default(),
            Some(Value::String(value)) => Priority::parse(value).ok_or_else(|| {
                PipelineError::invalid_job(format!(
                    "invalid 'priority': '{value}', must be 'immediate' or 'normal'"
                ))
            })?,
            Some(other) => {
                return Err(PipelineError::invalid_job(format!(
                    "invalid 'priority': {other}"
                )));
            }
        };

        let enqueued_at = match body.get("enqueued_at") {
            None | Some(Value::Null) => None,
            Some(Value::String(value)) if value.is_empty() => None,
            Some(Value::String(value)) => {
                Some(DateTime::parse_from_rfc3339(value).map_err(|_| {
                    PipelineError::invalid_job(format!("invalid 'enqueued_at' format: '{value}'"))
                })?)
            }
            Some(other) => {
                return Err(PipelineError::invalid_job(format!(
                    "invalid 'enqueued_at': {other}"
                )));
            }
        };

        Ok(Self {
            batch_id: batch_id.to_string(),
            user_id: user_id.to_string(),
            priority,
            enqueued_at,
        })
    }
}

/// Static consumer configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub priority_queue_id: String,
    pub normal_queue_id: String,
    pub poll_interval: Duration,
    pub batch_size: usize,
    /// Message lease length. Must exceed the longest expected end-to-end
    /// batch duration so a lease cannot expire mid-processing.
    pub visibility_timeout: Duration,
}

/// Polls priority-ordered queues and feeds validated jobs to a dispatch
/// callback. One logical worker: messages are handled sequentially.
pub struct QueueConsumer<T, S> {
    transport: Arc<T>,
    status_store: Arc<S>,
    config: ConsumerConfig,
    shutdown: CancellationToken,
}

impl<T, S> QueueConsumer<T, S>
where
    T: QueueTransport,
    S: StatusStore,
{
    pub fn new(transport: Arc<T>, status_store: Arc<S>, config: ConsumerConfig) -> Self {
        Self {
            transport,
            status_store,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelled by [`stop`](Self::stop); the owning process can use
    /// it to coordinate its shutdown grace period.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Signal the polling loop to stop. In-flight work in the current cycle
    /// is not interrupted.
    pub fn stop(&self) {
        info!("queue consumer stopping");
        self.shutdown.cancel();
    }

    /// Execute one poll cycle: priority queue first, then normal. Returns
    /// the number of messages handled (valid or not).
    pub async fn poll_once<D, Fut>(&self, dispatch: &D) -> usize
    where
        D: Fn(String, String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut processed = 0usize;

        let queue_ids = [
            self.config.priority_queue_id.as_str(),
            self.config.normal_queue_id.as_str(),
        ];
        for queue_id in queue_ids {
            if queue_id.is_empty() {
                continue;
            }
            let messages = match self
                .transport
                .pull(queue_id, self.config.batch_size, self.config.visibility_timeout)
                .await
            {
                Ok(messages) => messages,
                Err(e) => {
                    error!(queue_id, error = %e, "queue pull failed");
                    continue;
                }
            };
            for message in messages {
                self.process_message(queue_id, message, dispatch).await;
                processed += 1;
            }
        }

        processed
    }

    async fn process_message<D, Fut>(&self, queue_id: &str, message: QueueMessage, dispatch: &D)
    where
        D: Fn(String, String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let job = match ProcessingJob::from_message_body(&message.body) {
            Ok(job) => job,
            Err(e) => {
                warn!(message_id = %message.message_id, error = %e, "invalid message, nacking");
                if let Err(e) = self.transport.nack(queue_id, &message.lease_id).await {
                    error!(lease_id = %message.lease_id, error = %e, "nack failed");
                }
                return;
            }
        };

        info!(
            batch_id = %job.batch_id,
            user_id = %job.user_id,
            priority = %job.priority,
            "processing job"
        );

        // Best-effort: a stale status row is recoverable, a lost batch is not.
        let update = StatusUpdate::new(&job.batch_id, BatchStatus::Processing);
        if let Err(e) = self.status_store.update_status(&update).await {
            error!(batch_id = %job.batch_id, error = %e, "failed to mark batch as processing");
        }

        if let Err(e) = dispatch(job.batch_id.clone(), job.user_id.clone()).await {
            error!(batch_id = %job.batch_id, error = %e, "pipeline dispatch failed");
        }

        if let Err(e) = self.transport.ack(queue_id, &message.lease_id).await {
            error!(lease_id = %message.lease_id, error = %e, "ack failed");
        }
    }

    /// Poll until stopped, sleeping the poll interval between cycles.
    pub async fn run<D, Fut>(&self, dispatch: D)
    where
        D: Fn(String, String) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        info!("queue consumer starting poll loop");

        while self.is_running() {
            let count = self.poll_once(&dispatch).await;
            if count > 0 {
                info!(count, "processed messages this cycle");
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        info!("queue consumer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use crate::metrics::BatchMetrics;
    use crate::storage::status::{CompletionEvent, StageRow};

    /// In-memory transport that records pull order and ack/nack calls.
    struct MockTransport {
        queues: Mutex<HashMap<String, Vec<QueueMessage>>>,
        pull_order: Mutex<Vec<String>>,
        acks: Mutex<Vec<String>>,
        nacks: Mutex<Vec<String>>,
    }

    impl MockTransport {
        fn new() -> Self {
            Self {
                queues: Mutex::new(HashMap::new()),
                pull_order: Mutex::new(Vec::new()),
                acks: Mutex::new(Vec::new()),
                nacks: Mutex::new(Vec::new()),
            }
        }

        fn enqueue(&self, queue_id: &str, message: QueueMessage) {
            self.queues
                .lock()
                .unwrap()
                .entry(queue_id.to_string())
                .or_default()
                .push(message);
        }
    }

    #[async_trait]
    impl QueueTransport for MockTransport {
        async fn pull(
            &self,
            queue_id: &str,
            _batch_size: usize,
            _visibility_timeout: Duration,
        ) -> Result<Vec<QueueMessage>> {
            self.pull_order.lock().unwrap().push(queue_id.to_string());
            Ok(self
                .queues
                .lock()
                .unwrap()
                .remove(queue_id)
                .unwrap_or_default())
        }

        async fn ack(&self, _queue_id: &str, lease_id: &str) -> Result<()> {
            self.acks.lock().unwrap().push(lease_id.to_string());
            Ok(())
        }

        async fn nack(&self, _queue_id: &str, lease_id: &str) -> Result<()> {
            self.nacks.lock().unwrap().push(lease_id.to_string());
            Ok(())
        }
    }

    /// Status store fake recording updates, optionally failing them.
    struct MockStatusStore {
        updates: Mutex<Vec<StatusUpdate>>,
        fail_updates: bool,
    }

    impl MockStatusStore {
        fn new() -> Self {
            Self {
                updates: Mutex::new(Vec::new()),
                fail_updates: false,
            }
        }

        fn failing() -> Self {
            Self {
                updates: Mutex::new(Vec::new()),
                fail_updates: true,
            }
        }
    }

    #[async_trait]
    impl StatusStore for MockStatusStore {
        async fn update_status(&self, update: &StatusUpdate) -> Result<()> {
            if self.fail_updates {
                return Err(PipelineError::storage("update_status", "store down"));
            }
            self.updates.lock().unwrap().push(update.clone());
            Ok(())
        }

        async fn update_metrics(&self, _metrics: &BatchMetrics) -> Result<()> {
            Ok(())
        }

        async fn insert_stage_rows(&self, _batch_id: &str, _rows: &[StageRow]) -> Result<()> {
            Ok(())
        }

        async fn publish_completion_event(&self, _event: &CompletionEvent) -> Result<()> {
            Ok(())
        }
    }

    fn consumer_config() -> ConsumerConfig {
        ConsumerConfig {
            priority_queue_id: "q-priority".to_string(),
            normal_queue_id: "q-normal".to_string(),
            poll_interval: Duration::from_millis(10),
            batch_size: 10,
            visibility_timeout: Duration::from_secs(600),
        }
    }

    fn message(lease_id: &str, body: Value) -> QueueMessage {
        QueueMessage {
            message_id: format!("msg-{lease_id}"),
            lease_id: lease_id.to_string(),
            body,
        }
    }

    fn valid_body(batch_id: &str) -> Value {
        serde_json::json!({"batch_id": batch_id, "user_id": "user-1"})
    }

    #[tokio::test]
    async fn valid_message_is_dispatched_and_acked() {
        let transport = Arc::new(MockTransport::new());
        transport.enqueue("q-normal", message("l1", valid_body("b1")));
        let status = Arc::new(MockStatusStore::new());
        let consumer = QueueConsumer::new(transport.clone(), status.clone(), consumer_config());

        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let seen = dispatched.clone();
        let count = consumer
            .poll_once(&move |batch_id, user_id| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push((batch_id, user_id));
                    Ok(())
                }
            })
            .await;

        assert_eq!(count, 1);
        assert_eq!(
            dispatched.lock().unwrap().as_slice(),
            &[("b1".to_string(), "user-1".to_string())]
        );
        assert_eq!(transport.acks.lock().unwrap().as_slice(), &["l1".to_string()]);
        assert!(transport.nacks.lock().unwrap().is_empty());

        let updates = status.updates.lock().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].status, BatchStatus::Processing);
        assert_eq!(updates[0].batch_id, "b1");
    }

    #[tokio::test]
    async fn invalid_message_is_nacked_and_never_dispatched() {
        let transport = Arc::new(MockTransport::new());
        transport.enqueue("q-normal", message("l1", serde_json::json!({"user_id": "u"})));
        transport.enqueue(
            "q-normal",
            message(
                "l2",
                serde_json::json!({"batch_id": "b", "user_id": "u", "priority": "urgent"}),
            ),
        );
        transport.enqueue(
            "q-normal",
            message(
                "l3",
                serde_json::json!({"batch_id": "b", "user_id": "u", "enqueued_at": "yesterday"}),
            ),
        );
        let consumer = QueueConsumer::new(
            transport.clone(),
            Arc::new(MockStatusStore::new()),
            consumer_config(),
        );

        let dispatches = Arc::new(AtomicU32::new(0));
        let counter = dispatches.clone();
        let count = consumer
            .poll_once(&move |_batch_id, _user_id| {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Ok(()) }
            })
            .await;

        assert_eq!(count, 3);
        assert_eq!(dispatches.load(Ordering::Relaxed), 0);
        assert_eq!(
            transport.nacks.lock().unwrap().as_slice(),
            &["l1".to_string(), "l2".to_string(), "l3".to_string()]
        );
        assert!(transport.acks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn priority_queue_is_polled_first_even_when_empty() {
        let transport = Arc::new(MockTransport::new());
        transport.enqueue("q-normal", message("l1", valid_body("b1")));
        let consumer = QueueConsumer::new(
            transport.clone(),
            Arc::new(MockStatusStore::new()),
            consumer_config(),
        );

        consumer.poll_once(&|_b, _u| async { Ok(()) }).await;
        consumer.poll_once(&|_b, _u| async { Ok(()) }).await;

        assert_eq!(
            transport.pull_order.lock().unwrap().as_slice(),
            &[
                "q-priority".to_string(),
                "q-normal".to_string(),
                "q-priority".to_string(),
                "q-normal".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn dispatch_failure_still_acks_and_counts() {
        let transport = Arc::new(MockTransport::new());
        transport.enqueue("q-priority", message("l1", valid_body("b1")));
        let consumer = QueueConsumer::new(
            transport.clone(),
            Arc::new(MockStatusStore::new()),
            consumer_config(),
        );

        let count = consumer
            .poll_once(&|_b, _u| async { Err(PipelineError::internal("pipeline crashed")) })
            .await;

        assert_eq!(count, 1);
        assert_eq!(transport.acks.lock().unwrap().as_slice(), &["l1".to_string()]);
        assert!(transport.nacks.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn status_store_failure_does_not_block_dispatch() {
        let transport = Arc::new(MockTransport::new());
        transport.enqueue("q-normal", message("l1", valid_body("b1")));
        let consumer = QueueConsumer::new(
            transport.clone(),
            Arc::new(MockStatusStore::failing()),
            consumer_config(),
        );

        let dispatches = Arc::new(AtomicU32::new(0));
        let counter = dispatches.clone();
        consumer
            .poll_once(&move |_b, _u| {
                counter.fetch_add(1, Ordering::Relaxed);
                async { Ok(()) }
            })
            .await;

        assert_eq!(dispatches.load(Ordering::Relaxed), 1);
        assert_eq!(transport.acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn embedded_json_string_body_is_normalized() {
        let transport = Arc::new(MockTransport::new());
        let embedded = serde_json::json!({"batch_id": "b1", "user_id": "u1"}).to_string();
        transport.enqueue("q-normal", message("l1", Value::String(embedded)));
        let consumer = QueueConsumer::new(
            transport.clone(),
            Arc::new(MockStatusStore::new()),
            consumer_config(),
        );

        let dispatched = Arc::new(Mutex::new(Vec::new()));
        let seen = dispatched.clone();
        consumer
            .poll_once(&move |batch_id, _user_id| {
                let seen = seen.clone();
                async move {
                    seen.lock().unwrap().push(batch_id);
                    Ok(())
                }
            })
            .await;

        assert_eq!(dispatched.lock().unwrap().as_slice(), &["b1".to_string()]);
    }

    #[tokio::test]
    async fn run_loop_stops_after_cancel() {
        let transport = Arc::new(MockTransport::new());
        transport.enqueue("q-normal", message("l1", valid_body("b1")));
        let consumer = Arc::new(QueueConsumer::new(
            transport.clone(),
            Arc::new(MockStatusStore::new()),
            consumer_config(),
        ));

        let runner = consumer.clone();
        let handle = tokio::spawn(async move { runner.run(|_b, _u| async { Ok(()) }).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        consumer.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("run loop did not stop after cancel")
            .unwrap();

        assert!(!consumer.is_running());
        assert_eq!(transport.acks.lock().unwrap().len(), 1);
    }

    #[test]
    fn job_priority_defaults_to_normal() {
        let job = ProcessingJob::from_message_body(&valid_body("b1")).unwrap();
        assert_eq!(job.priority, Priority::Normal);
        assert!(job.enqueued_at.is_none());
    }

    #[test]
    fn job_accepts_immediate_priority_and_timestamp() {
        let body = serde_json::json!({
            "batch_id": "b1",
            "user_id": "u1",
            "priority": "immediate",
            "enqueued_at": "2026-03-01T10:00:00+00:00",
        });
        let job = ProcessingJob::from_message_body(&body).unwrap();
        assert_eq!(job.priority, Priority::Immediate);
        assert!(job.enqueued_at.is_some());
    }

    #[test]
    fn job_rejects_empty_identifiers() {
        let body = serde_json::json!({"batch_id": "", "user_id": "u1"});
        assert!(ProcessingJob::from_message_body(&body).is_err());
        let body = serde_json::json!({"batch_id": "b1", "user_id": ""});
        assert!(ProcessingJob::from_message_body(&body).is_err());
    }

    #[test]
    fn job_treats_empty_enqueued_at_as_absent() {
        let body = serde_json::json!({"batch_id": "b1", "user_id": "u1", "enqueued_at": ""});
        let job = ProcessingJob::from_message_body(&body).unwrap();
        assert!(job.enqueued_at.is_none());
    }
}
