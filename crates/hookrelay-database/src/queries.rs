//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter so it can run
//! inside the async executor's `call` closures. Time-sensitive queries take
//! `now` explicitly so callers (and tests) control the clock.

use crate::{
    DatabaseError, DatabaseResult, NewWebhookAttempt, NewWebhookTask, QueueStats, TaskStatus,
    WebhookAttempt, WebhookTask,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};

// ==========================================
// Tasks
// ==========================================

/// Insert a new webhook task in `pending` state with zero attempts.
pub fn insert_task(conn: &Connection, task: &NewWebhookTask) -> DatabaseResult<WebhookTask> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO webhook_tasks (id, target_url, payload, attempts, max_attempts, status, next_attempt_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, 0, ?4, 'pending', ?5, ?6, ?6)",
        params![
            task.id,
            task.target_url,
            task.payload,
            task.max_attempts,
            task.next_attempt_at.to_rfc3339(),
            now,
        ],
    )?;
    get_task(conn, &task.id)?
        .ok_or_else(|| DatabaseError::NotFound("Task not found after insert".to_string()))
}

/// Get a webhook task by ID.
pub fn get_task(conn: &Connection, id: &str) -> DatabaseResult<Option<WebhookTask>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, target_url, payload, attempts, max_attempts, status, last_error, next_attempt_at, created_at, updated_at, completed_at
         FROM webhook_tasks WHERE id = ?1",
    )?;

    let result = stmt.query_row(params![id], map_task_row);

    match result {
        Ok(task) => Ok(Some(task)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Get due pending tasks without claiming them, FIFO by creation time.
///
/// Never returns inflight or terminal tasks, never returns tasks scheduled
/// in the future.
pub fn fetch_due(
    conn: &Connection,
    limit: i64,
    now: DateTime<Utc>,
) -> DatabaseResult<Vec<WebhookTask>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, target_url, payload, attempts, max_attempts, status, last_error, next_attempt_at, created_at, updated_at, completed_at
         FROM webhook_tasks
         WHERE status = 'pending' AND next_attempt_at <= ?1
         ORDER BY created_at ASC
         LIMIT ?2",
    )?;

    let tasks = stmt
        .query_map(params![now.to_rfc3339(), limit], map_task_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tasks)
}

/// Atomically claim up to `limit` due pending tasks, moving them to
/// `inflight`, and return the claimed rows FIFO by creation time.
///
/// The per-row conditional update is the claim: a task already claimed by a
/// concurrent dispatcher no longer matches `status = 'pending'` and is
/// skipped, so no task is delivered by two invocations at once.
pub fn claim_due(
    conn: &Connection,
    limit: i64,
    now: DateTime<Utc>,
) -> DatabaseResult<Vec<WebhookTask>> {
    let now_str = now.to_rfc3339();

    let ids: Vec<String> = {
        let mut stmt = conn.prepare_cached(
            "SELECT id FROM webhook_tasks
             WHERE status = 'pending' AND next_attempt_at <= ?1
             ORDER BY created_at ASC
             LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![now_str, limit], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;
        ids
    };

    let mut claimed = Vec::with_capacity(ids.len());
    for id in ids {
        let changed = conn.execute(
            "UPDATE webhook_tasks SET status = 'inflight', updated_at = ?2
             WHERE id = ?1 AND status = 'pending'",
            params![id, now_str],
        )?;
        if changed == 0 {
            // Lost the race to another dispatcher invocation
            continue;
        }
        if let Some(task) = get_task(conn, &id)? {
            claimed.push(task);
        }
    }

    Ok(claimed)
}

/// Transition a task to `completed` and count the final attempt.
///
/// Only non-terminal tasks match, so calling this on an already-completed
/// task is a no-op. Returns whether a row was updated.
pub fn mark_completed(conn: &Connection, id: &str) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE webhook_tasks
         SET status = 'completed', attempts = attempts + 1, completed_at = ?2, updated_at = ?2
         WHERE id = ?1 AND status IN ('pending', 'inflight')",
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// Transition a task to `failed`, recording the reason and counting the
/// final attempt. Returns whether a row was updated.
pub fn mark_failed(conn: &Connection, id: &str, reason: &str) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE webhook_tasks
         SET status = 'failed', attempts = attempts + 1, last_error = ?2, updated_at = ?3
         WHERE id = ?1 AND status IN ('pending', 'inflight')",
        params![id, reason, now],
    )?;
    Ok(changed > 0)
}

/// Schedule a retry: increment attempts, record the failure reason, return
/// the task to `pending`, and push `next_attempt_at` forward. Returns
/// whether a row was updated.
pub fn schedule_retry(
    conn: &Connection,
    id: &str,
    next_attempt_at: DateTime<Utc>,
    reason: &str,
) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE webhook_tasks
         SET status = 'pending', attempts = attempts + 1, last_error = ?2, next_attempt_at = ?3, updated_at = ?4
         WHERE id = ?1 AND status IN ('pending', 'inflight')",
        params![id, reason, next_attempt_at.to_rfc3339(), now],
    )?;
    Ok(changed > 0)
}

/// Reset inflight tasks to pending (crash recovery).
///
/// A task left `inflight` belongs to a dispatcher that died mid-batch; its
/// `next_attempt_at` is untouched, so it becomes due again immediately.
pub fn reset_inflight(conn: &Connection) -> DatabaseResult<usize> {
    let now = Utc::now().to_rfc3339();
    let count = conn.execute(
        "UPDATE webhook_tasks SET status = 'pending', updated_at = ?1
         WHERE status = 'inflight'",
        params![now],
    )?;
    Ok(count)
}

/// Operator override: return a failed task to the queue with a fresh
/// attempt budget, immediately due. Returns whether a row was updated.
pub fn requeue_task(conn: &Connection, id: &str) -> DatabaseResult<bool> {
    let now = Utc::now().to_rfc3339();
    let changed = conn.execute(
        "UPDATE webhook_tasks
         SET status = 'pending', attempts = 0, last_error = NULL, completed_at = NULL,
             next_attempt_at = ?2, updated_at = ?2
         WHERE id = ?1 AND status = 'failed'",
        params![id, now],
    )?;
    Ok(changed > 0)
}

/// List tasks, optionally filtered by status, newest first.
pub fn list_tasks(
    conn: &Connection,
    status: Option<TaskStatus>,
    limit: i64,
) -> DatabaseResult<Vec<WebhookTask>> {
    let tasks = match status {
        Some(status) => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, target_url, payload, attempts, max_attempts, status, last_error, next_attempt_at, created_at, updated_at, completed_at
                 FROM webhook_tasks
                 WHERE status = ?1
                 ORDER BY created_at DESC
                 LIMIT ?2",
            )?;
            let tasks = stmt
                .query_map(params![status.as_str(), limit], map_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            tasks
        }
        None => {
            let mut stmt = conn.prepare_cached(
                "SELECT id, target_url, payload, attempts, max_attempts, status, last_error, next_attempt_at, created_at, updated_at, completed_at
                 FROM webhook_tasks
                 ORDER BY created_at DESC
                 LIMIT ?1",
            )?;
            let tasks = stmt
                .query_map(params![limit], map_task_row)?
                .collect::<Result<Vec<_>, _>>()?;
            tasks
        }
    };

    Ok(tasks)
}

/// Count tasks by status.
pub fn queue_stats(conn: &Connection) -> DatabaseResult<QueueStats> {
    let mut stmt =
        conn.prepare_cached("SELECT status, COUNT(*) FROM webhook_tasks GROUP BY status")?;

    let rows = stmt.query_map([], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
    })?;

    let mut stats = QueueStats::default();
    for row in rows {
        let (status, count) = row?;
        match TaskStatus::from_str(&status) {
            TaskStatus::Pending => stats.pending = count,
            TaskStatus::Inflight => stats.inflight = count,
            TaskStatus::Completed => stats.completed = count,
            TaskStatus::Failed => stats.failed = count,
        }
    }

    Ok(stats)
}

// ==========================================
// Attempt history
// ==========================================

/// Record one delivery attempt.
pub fn insert_attempt(conn: &Connection, attempt: &NewWebhookAttempt) -> DatabaseResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO webhook_attempts (task_id, attempt_number, status_code, error, duration_ms, attempted_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            attempt.task_id,
            attempt.attempt_number,
            attempt.status_code,
            attempt.error,
            attempt.duration_ms,
            now,
        ],
    )?;
    Ok(())
}

/// List recorded attempts for a task, in attempt order.
pub fn list_attempts(conn: &Connection, task_id: &str) -> DatabaseResult<Vec<WebhookAttempt>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, task_id, attempt_number, status_code, error, duration_ms, attempted_at
         FROM webhook_attempts
         WHERE task_id = ?1
         ORDER BY attempt_number ASC",
    )?;

    let attempts = stmt
        .query_map(params![task_id], |row| {
            Ok(WebhookAttempt {
                id: row.get(0)?,
                task_id: row.get(1)?,
                attempt_number: row.get(2)?,
                status_code: row.get(3)?,
                error: row.get(4)?,
                duration_ms: row.get(5)?,
                attempted_at: parse_datetime(row.get::<_, String>(6)?),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(attempts)
}

// ==========================================
// Helpers
// ==========================================

fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WebhookTask> {
    Ok(WebhookTask {
        id: row.get(0)?,
        target_url: row.get(1)?,
        payload: row.get(2)?,
        attempts: row.get(3)?,
        max_attempts: row.get(4)?,
        status: TaskStatus::from_str(&row.get::<_, String>(5)?),
        last_error: row.get(6)?,
        next_attempt_at: parse_datetime(row.get::<_, String>(7)?),
        created_at: parse_datetime(row.get::<_, String>(8)?),
        updated_at: parse_datetime(row.get::<_, String>(9)?),
        completed_at: row.get::<_, Option<String>>(10)?.map(parse_datetime),
    })
}

/// Parse an RFC3339 datetime string, falling back to current time on error.
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
