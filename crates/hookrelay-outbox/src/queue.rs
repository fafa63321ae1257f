//! Durable webhook queue backed by SQLite.
//!
//! The queue is the single write path for task state. Every transition is a
//! conditional UPDATE in the store, so completed and failed tasks can never
//! be pulled back into delivery and a task claimed by one batch is invisible
//! to the next.

use crate::{OutboxError, OutboxResult};
use chrono::{DateTime, Utc};
use hookrelay_database::{
    queries, AsyncDatabase, NewWebhookAttempt, NewWebhookTask, QueueStats, TaskStatus,
    WebhookAttempt, WebhookTask,
};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Default ceiling on delivery attempts per task.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;

/// Options accepted when enqueueing a task.
#[derive(Debug, Clone, Default)]
pub struct EnqueueOptions {
    /// Attempt ceiling for this task. Uses the queue default when `None`.
    pub max_attempts: Option<i64>,
    /// Delay before the task first becomes due. Due immediately when `None`.
    pub initial_delay: Option<Duration>,
}

/// Durable queue of webhook delivery tasks.
#[derive(Clone)]
pub struct WebhookQueue {
    db: AsyncDatabase,
    default_max_attempts: i64,
}

impl WebhookQueue {
    /// Create a queue over an open database.
    pub fn new(db: AsyncDatabase) -> Self {
        Self {
            db,
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override the default attempt ceiling applied at enqueue time.
    pub fn with_default_max_attempts(mut self, default_max_attempts: i64) -> Self {
        self.default_max_attempts = default_max_attempts.max(1);
        self
    }

    /// Enqueue a webhook delivery.
    ///
    /// The payload is serialized once at enqueue time and delivered verbatim
    /// on every attempt. Returns the id of the new task.
    pub async fn enqueue(
        &self,
        target_url: &str,
        payload: &serde_json::Value,
        options: EnqueueOptions,
    ) -> OutboxResult<String> {
        let url = Url::parse(target_url)
            .map_err(|e| OutboxError::InvalidTargetUrl(format!("{}: {}", target_url, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(OutboxError::InvalidTargetUrl(format!(
                "{}: unsupported scheme '{}'",
                target_url,
                url.scheme()
            )));
        }

        let max_attempts = options
            .max_attempts
            .unwrap_or(self.default_max_attempts)
            .max(1);
        let initial_delay = options.initial_delay.unwrap_or(Duration::ZERO);
        let next_attempt_at =
            Utc::now() + chrono::Duration::milliseconds(initial_delay.as_millis() as i64);

        let task = NewWebhookTask {
            id: uuid::Uuid::new_v4().to_string(),
            target_url: target_url.to_string(),
            payload: serde_json::to_string(payload)?,
            max_attempts,
            next_attempt_at,
        };

        let inserted = self
            .db
            .call(move |conn| queries::insert_task(conn, &task))
            .await?;

        info!(
            task_id = %inserted.id,
            target_url = %inserted.target_url,
            max_attempts = inserted.max_attempts,
            "Webhook task enqueued"
        );

        Ok(inserted.id)
    }

    /// Fetch due pending tasks without claiming them, oldest first.
    pub async fn fetch_due(&self, limit: i64) -> OutboxResult<Vec<WebhookTask>> {
        let now = Utc::now();
        let tasks = self
            .db
            .call(move |conn| queries::fetch_due(conn, limit, now))
            .await?;
        Ok(tasks)
    }

    /// Claim up to `limit` due tasks for delivery.
    ///
    /// Claimed tasks move to `inflight` and stop matching due queries, so
    /// overlapping dispatcher invocations never deliver the same task twice.
    pub async fn claim_due(&self, limit: i64) -> OutboxResult<Vec<WebhookTask>> {
        let now = Utc::now();
        let tasks = self
            .db
            .call(move |conn| queries::claim_due(conn, limit, now))
            .await?;

        if !tasks.is_empty() {
            debug!(count = tasks.len(), "Claimed due webhook tasks");
        }

        Ok(tasks)
    }

    /// Record a successful delivery.
    ///
    /// Counts the attempt and moves the task to `completed`. Returns false
    /// when the task was already terminal, in which case nothing changes.
    pub async fn mark_completed(&self, id: &str) -> OutboxResult<bool> {
        let id_owned = id.to_string();
        let updated = self
            .db
            .call(move |conn| queries::mark_completed(conn, &id_owned))
            .await?;

        if updated {
            info!(task_id = %id, "Webhook task completed");
        }

        Ok(updated)
    }

    /// Record a final failure after the attempt budget is exhausted.
    ///
    /// Counts the attempt and moves the task to `failed`. Returns false when
    /// the task was already terminal.
    pub async fn mark_failed_permanently(&self, id: &str, reason: &str) -> OutboxResult<bool> {
        let id_owned = id.to_string();
        let reason_owned = reason.to_string();
        let updated = self
            .db
            .call(move |conn| queries::mark_failed(conn, &id_owned, &reason_owned))
            .await?;

        Ok(updated)
    }

    /// Record a failed attempt and schedule the next one.
    ///
    /// Counts the attempt, stores the failure reason, and returns the task
    /// to `pending` with the given due time. Returns false when the task was
    /// already terminal.
    pub async fn schedule_retry(
        &self,
        id: &str,
        next_attempt_at: DateTime<Utc>,
        reason: &str,
    ) -> OutboxResult<bool> {
        let id_owned = id.to_string();
        let reason_owned = reason.to_string();
        let updated = self
            .db
            .call(move |conn| {
                queries::schedule_retry(conn, &id_owned, next_attempt_at, &reason_owned)
            })
            .await?;

        Ok(updated)
    }

    /// Return tasks stranded in `inflight` to `pending`.
    ///
    /// Call once at startup. A crash between claiming and settling leaves
    /// tasks inflight; resetting them re-delivers, which at-least-once
    /// delivery permits.
    pub async fn recover(&self) -> OutboxResult<usize> {
        let reset = self.db.call(|conn| queries::reset_inflight(conn)).await?;

        if reset > 0 {
            info!(count = reset, "Recovered inflight webhook tasks to pending");
        }

        Ok(reset)
    }

    /// Return a failed task to the queue with a fresh attempt budget.
    pub async fn requeue(&self, id: &str) -> OutboxResult<bool> {
        let id_owned = id.to_string();
        let updated = self
            .db
            .call(move |conn| queries::requeue_task(conn, &id_owned))
            .await?;

        if updated {
            info!(task_id = %id, "Webhook task requeued");
        }

        Ok(updated)
    }

    /// Look up a single task.
    pub async fn get(&self, id: &str) -> OutboxResult<Option<WebhookTask>> {
        let id_owned = id.to_string();
        let task = self
            .db
            .call(move |conn| queries::get_task(conn, &id_owned))
            .await?;
        Ok(task)
    }

    /// Look up a single task, erroring when it does not exist.
    pub async fn get_required(&self, id: &str) -> OutboxResult<WebhookTask> {
        self.get(id)
            .await?
            .ok_or_else(|| OutboxError::TaskNotFound(id.to_string()))
    }

    /// List recent tasks, optionally filtered by status.
    pub async fn list(
        &self,
        status: Option<TaskStatus>,
        limit: i64,
    ) -> OutboxResult<Vec<WebhookTask>> {
        let tasks = self
            .db
            .call(move |conn| queries::list_tasks(conn, status, limit))
            .await?;
        Ok(tasks)
    }

    /// Per-status task counts.
    pub async fn stats(&self) -> OutboxResult<QueueStats> {
        let stats = self.db.call(|conn| queries::queue_stats(conn)).await?;
        Ok(stats)
    }

    /// Record one delivery attempt in the history log.
    pub async fn record_attempt(&self, attempt: NewWebhookAttempt) -> OutboxResult<()> {
        self.db
            .call(move |conn| queries::insert_attempt(conn, &attempt))
            .await?;
        Ok(())
    }

    /// Delivery attempt history for a task, oldest first.
    pub async fn attempts(&self, task_id: &str) -> OutboxResult<Vec<WebhookAttempt>> {
        let task_id_owned = task_id.to_string();
        let attempts = self
            .db
            .call(move |conn| queries::list_attempts(conn, &task_id_owned))
            .await?;
        Ok(attempts)
    }
}
