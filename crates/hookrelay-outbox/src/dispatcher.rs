//! Batch dispatcher for due webhook tasks.

use crate::{BackoffPolicy, DeliveryOutcome, HttpSender, OutboxResult, WebhookQueue};
use chrono::Utc;
use futures_util::future::join_all;
use hookrelay_database::{NewWebhookAttempt, WebhookTask};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Dispatcher configuration.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of due tasks claimed per batch.
    pub batch_limit: i64,
    /// Delay policy applied after failed attempts.
    pub backoff: BackoffPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            batch_limit: 100,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Counts for one settled batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Tasks claimed into the batch.
    pub claimed: usize,
    /// Tasks that reached `completed`.
    pub completed: usize,
    /// Tasks scheduled for a later attempt.
    pub retried: usize,
    /// Tasks that exhausted their attempt budget.
    pub failed: usize,
}

impl BatchSummary {
    pub fn is_empty(&self) -> bool {
        self.claimed == 0
    }
}

enum TaskResolution {
    Completed,
    Retried,
    Failed,
    /// The delivery outcome could not be written back to the store. The
    /// task stays inflight until the next recovery pass.
    Abandoned,
}

/// Drives delivery attempts for batches of due tasks.
///
/// The dispatcher owns no timer. An external scheduler calls
/// `process_pending_batch` periodically; each call claims one batch and
/// settles every task in it before returning.
pub struct Dispatcher {
    queue: WebhookQueue,
    sender: HttpSender,
    config: DispatcherConfig,
}

impl Dispatcher {
    pub fn new(queue: WebhookQueue, sender: HttpSender, config: DispatcherConfig) -> Self {
        Self {
            queue,
            sender,
            config,
        }
    }

    /// Claim one batch of due tasks and settle every delivery in it.
    ///
    /// Attempts run concurrently and each task settles on its own: a
    /// rejection, timeout, or connect failure on one task never disturbs
    /// the rest of the batch. Returns once every claimed task has been
    /// written back.
    pub async fn process_pending_batch(&self) -> OutboxResult<BatchSummary> {
        let tasks = self.queue.claim_due(self.config.batch_limit).await?;
        if tasks.is_empty() {
            return Ok(BatchSummary::default());
        }

        debug!(claimed = tasks.len(), "Processing webhook batch");

        let results = join_all(tasks.into_iter().map(|task| self.process_one(task))).await;

        let mut summary = BatchSummary {
            claimed: results.len(),
            ..Default::default()
        };
        for resolution in results {
            match resolution {
                TaskResolution::Completed => summary.completed += 1,
                TaskResolution::Retried => summary.retried += 1,
                TaskResolution::Failed => summary.failed += 1,
                TaskResolution::Abandoned => {}
            }
        }

        info!(
            claimed = summary.claimed,
            completed = summary.completed,
            retried = summary.retried,
            failed = summary.failed,
            "Webhook batch settled"
        );

        Ok(summary)
    }

    /// Attempt delivery of one claimed task and record the outcome.
    async fn process_one(&self, task: WebhookTask) -> TaskResolution {
        let attempt_number = task.attempts + 1;
        let started = Instant::now();
        let outcome = self.sender.deliver(&task).await;
        let duration_ms = started.elapsed().as_millis() as i64;

        self.record_attempt(&task, attempt_number, &outcome, duration_ms)
            .await;

        if outcome.is_success() {
            return match self.queue.mark_completed(&task.id).await {
                Ok(_) => {
                    debug!(task_id = %task.id, attempt = attempt_number, "Webhook delivered");
                    TaskResolution::Completed
                }
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "Failed to record webhook completion");
                    TaskResolution::Abandoned
                }
            };
        }

        let reason = outcome
            .error_message()
            .unwrap_or_else(|| "delivery failed".to_string());

        if attempt_number >= task.max_attempts {
            return match self.queue.mark_failed_permanently(&task.id, &reason).await {
                Ok(_) => {
                    warn!(
                        task_id = %task.id,
                        attempts = attempt_number,
                        reason = %reason,
                        "Webhook failed permanently"
                    );
                    TaskResolution::Failed
                }
                Err(e) => {
                    error!(task_id = %task.id, error = %e, "Failed to record webhook failure");
                    TaskResolution::Abandoned
                }
            };
        }

        let delay = self.config.backoff.delay_after_failure(attempt_number);
        let next_attempt_at = Utc::now() + chrono::Duration::milliseconds(delay.as_millis() as i64);

        match self
            .queue
            .schedule_retry(&task.id, next_attempt_at, &reason)
            .await
        {
            Ok(_) => {
                debug!(
                    task_id = %task.id,
                    attempt = attempt_number,
                    delay_ms = delay.as_millis() as u64,
                    reason = %reason,
                    "Webhook retry scheduled"
                );
                TaskResolution::Retried
            }
            Err(e) => {
                error!(task_id = %task.id, error = %e, "Failed to schedule webhook retry");
                TaskResolution::Abandoned
            }
        }
    }

    /// Append the attempt to the history log. Best effort: history must
    /// never block settling the task itself.
    async fn record_attempt(
        &self,
        task: &WebhookTask,
        attempt_number: i64,
        outcome: &DeliveryOutcome,
        duration_ms: i64,
    ) {
        let attempt = NewWebhookAttempt {
            task_id: task.id.clone(),
            attempt_number,
            status_code: outcome.status_code(),
            error: outcome.error_message(),
            duration_ms,
        };

        if let Err(e) = self.queue.record_attempt(attempt).await {
            warn!(task_id = %task.id, error = %e, "Failed to record delivery attempt");
        }
    }
}
