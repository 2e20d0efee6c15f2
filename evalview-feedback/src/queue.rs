// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Sequential feedback submission queue
//!
//! Submissions go through a bounded channel to a single worker task that
//! sends them one at a time, in enqueue order. A failed submission is
//! logged, reported to the outcome listener and dropped; there is no
//! retry.
//!
//! ```text
//! enqueue() ──► [ mpsc (capacity N) ] ──► worker ──► FeedbackSubmitter::submit
//!                                            │
//!                                            └──► stats / outcome listener
//! ```

use evalview_core::config::FeedbackConfig;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{Result, SubmitError};
use crate::submitter::FeedbackSubmitter;

/// Configuration for the submission queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum number of submissions waiting to be sent
    pub capacity: usize,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

impl From<&FeedbackConfig> for QueueConfig {
    fn from(config: &FeedbackConfig) -> Self {
        Self {
            capacity: config.queue_capacity.max(1),
        }
    }
}

/// One queued submission
#[derive(Debug, Clone)]
pub struct Submission {
    pub row_id: String,
    pub payload: Value,
}

/// Result of one submission, reported to the outcome listener
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubmissionOutcome {
    Submitted { row_id: String },
    Failed { row_id: String, error: String },
}

impl SubmissionOutcome {
    pub fn row_id(&self) -> &str {
        match self {
            SubmissionOutcome::Submitted { row_id } | SubmissionOutcome::Failed { row_id, .. } => row_id,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubmissionOutcome::Submitted { .. })
    }
}

/// Statistics for the queue
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    /// Submissions the backend accepted
    pub submitted: u64,
    /// Submissions that failed and were dropped
    pub failed: u64,
    /// Queued or in-flight submissions
    pub pending: usize,
    /// Average time per submission (ms)
    pub avg_latency_ms: f64,
    pub last_error: Option<String>,
}

#[derive(Debug, Default)]
struct QueueStatsInternal {
    submitted: u64,
    failed: u64,
    total_latency: Duration,
    last_error: Option<String>,
}

/// Handle to a running submission queue
pub struct SubmissionQueue {
    sender: mpsc::Sender<Submission>,
    worker: JoinHandle<()>,
    pending: Arc<AtomicUsize>,
    stats: Arc<RwLock<QueueStatsInternal>>,
}

impl SubmissionQueue {
    /// Start the worker task. Must be called inside a tokio runtime.
    pub fn spawn<S>(submitter: S, config: QueueConfig) -> Self
    where
        S: FeedbackSubmitter + 'static,
    {
        Self::start(Arc::new(submitter), config, None)
    }

    /// Like [`SubmissionQueue::spawn`], also returning a stream of outcomes
    pub fn spawn_with_outcomes<S>(
        submitter: S,
        config: QueueConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SubmissionOutcome>)
    where
        S: FeedbackSubmitter + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::start(Arc::new(submitter), config, Some(tx)), rx)
    }

    fn start(
        submitter: Arc<dyn FeedbackSubmitter>,
        config: QueueConfig,
        listener: Option<mpsc::UnboundedSender<SubmissionOutcome>>,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let pending = Arc::new(AtomicUsize::new(0));
        let stats = Arc::new(RwLock::new(QueueStatsInternal::default()));

        let worker = tokio::spawn(submission_worker(
            receiver,
            submitter,
            pending.clone(),
            stats.clone(),
            listener,
        ));

        Self {
            sender,
            worker,
            pending,
            stats,
        }
    }

    /// Queue feedback for a row without waiting for it to be sent
    pub fn enqueue(&self, row_id: impl Into<String>, payload: Value) -> Result<()> {
        let submission = Submission {
            row_id: row_id.into(),
            payload,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        match self.sender.try_send(submission) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.pending.fetch_sub(1, Ordering::SeqCst);
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => SubmitError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => SubmitError::QueueClosed,
                })
            }
        }
    }

    /// Queue feedback, waiting for room when the queue is full
    pub async fn enqueue_wait(&self, row_id: impl Into<String>, payload: Value) -> Result<()> {
        let submission = Submission {
            row_id: row_id.into(),
            payload,
        };

        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(submission).await.is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            return Err(SubmitError::QueueClosed);
        }
        Ok(())
    }

    /// Queued plus in-flight submissions
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Get current statistics
    pub fn stats(&self) -> QueueStats {
        snapshot(&self.stats, self.pending())
    }

    /// Stop accepting submissions, drain the queue and wait for the worker
    pub async fn shutdown(self) -> QueueStats {
        let SubmissionQueue {
            sender,
            worker,
            pending,
            stats,
        } = self;
        drop(sender);

        if let Err(e) = worker.await {
            warn!("Submission worker ended abnormally: {}", e);
        }

        let stats = snapshot(&stats, pending.load(Ordering::SeqCst));
        info!(
            submitted = stats.submitted,
            failed = stats.failed,
            "Submission queue shut down"
        );
        stats
    }
}

fn snapshot(stats: &RwLock<QueueStatsInternal>, pending: usize) -> QueueStats {
    let internal = stats.read();
    let completed = internal.submitted + internal.failed;
    QueueStats {
        submitted: internal.submitted,
        failed: internal.failed,
        pending,
        avg_latency_ms: if completed > 0 {
            internal.total_latency.as_secs_f64() * 1000.0 / completed as f64
        } else {
            0.0
        },
        last_error: internal.last_error.clone(),
    }
}

/// Pops one submission, awaits it, then pops the next
async fn submission_worker(
    mut receiver: mpsc::Receiver<Submission>,
    submitter: Arc<dyn FeedbackSubmitter>,
    pending: Arc<AtomicUsize>,
    stats: Arc<RwLock<QueueStatsInternal>>,
    listener: Option<mpsc::UnboundedSender<SubmissionOutcome>>,
) {
    debug!("Submission worker started");

    while let Some(submission) = receiver.recv().await {
        let started = Instant::now();
        let result = submitter
            .submit(&submission.row_id, &submission.payload)
            .await;
        let elapsed = started.elapsed();

        let outcome = {
            let mut s = stats.write();
            s.total_latency += elapsed;
            match result {
                Ok(()) => {
                    s.submitted += 1;
                    debug!(row_id = %submission.row_id, "Feedback submitted");
                    SubmissionOutcome::Submitted {
                        row_id: submission.row_id,
                    }
                }
                Err(e) => {
                    s.failed += 1;
                    s.last_error = Some(e.to_string());
                    warn!(row_id = %submission.row_id, "Failed to submit feedback: {}", e);
                    SubmissionOutcome::Failed {
                        row_id: submission.row_id,
                        error: e.to_string(),
                    }
                }
            }
        };
        pending.fetch_sub(1, Ordering::SeqCst);

        if let Some(listener) = &listener {
            // A dropped receiver just means nobody is listening any more
            let _ = listener.send(outcome);
        }
    }

    debug!("Submission worker shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl FeedbackSubmitter for Recorder {
        async fn submit(&self, row_id: &str, _payload: &Value) -> Result<()> {
            self.calls.lock().push(row_id.to_string());
            if row_id.starts_with("bad") {
                return Err(SubmitError::Rejected {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_drains_in_order_on_shutdown() {
        let recorder = Arc::new(Recorder::default());
        let queue = SubmissionQueue::spawn(recorder.clone(), QueueConfig::default());

        for i in 0..5 {
            queue.enqueue(format!("row-{}", i), json!({"score": i})).unwrap();
        }
        let stats = queue.shutdown().await;

        assert_eq!(stats.submitted, 5);
        assert_eq!(stats.pending, 0);
        assert_eq!(
            *recorder.calls.lock(),
            vec!["row-0", "row-1", "row-2", "row-3", "row-4"]
        );
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_dropped() {
        let recorder = Arc::new(Recorder::default());
        let (queue, mut outcomes) =
            SubmissionQueue::spawn_with_outcomes(recorder.clone(), QueueConfig::default());

        queue.enqueue("bad-1", json!({})).unwrap();
        queue.enqueue("row-2", json!({})).unwrap();

        let first = outcomes.recv().await.unwrap();
        assert!(!first.is_success());
        assert_eq!(first.row_id(), "bad-1");
        let second = outcomes.recv().await.unwrap();
        assert_eq!(
            second,
            SubmissionOutcome::Submitted {
                row_id: "row-2".to_string()
            }
        );

        let stats = queue.shutdown().await;
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.submitted, 1);
        assert!(stats.last_error.unwrap().contains("500"));
        assert_eq!(recorder.calls.lock().len(), 2);
    }

    #[test]
    fn test_config_from_feedback_settings() {
        let mut settings = FeedbackConfig::default();
        settings.queue_capacity = 0;
        assert_eq!(QueueConfig::from(&settings).capacity, 1);
    }
}
