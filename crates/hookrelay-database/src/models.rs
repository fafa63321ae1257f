//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Webhook task status.
///
/// `completed` and `failed` are terminal; a task in either state is never
/// dispatched again. `inflight` marks a task a live dispatcher batch has
/// claimed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Inflight,
    Completed,
    Failed,
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Inflight => "inflight",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "inflight" => Self::Inflight,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    /// Whether this status is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Webhook task - one delivery obligation, tracked through retries until
/// a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookTask {
    pub id: String,
    pub target_url: String,
    /// Serialized JSON body, delivered verbatim.
    pub payload: String,
    /// Delivery attempts whose outcome has been recorded so far.
    pub attempts: i64,
    pub max_attempts: i64,
    pub status: TaskStatus,
    pub last_error: Option<String>,
    pub next_attempt_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// New webhook task for insertion.
#[derive(Debug, Clone)]
pub struct NewWebhookTask {
    pub id: String,
    pub target_url: String,
    pub payload: String,
    pub max_attempts: i64,
    pub next_attempt_at: DateTime<Utc>,
}

/// One recorded delivery attempt for a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAttempt {
    pub id: i64,
    pub task_id: String,
    /// 1-indexed attempt number, matching the attempt header sent over the wire.
    pub attempt_number: i64,
    /// HTTP status code, None for transport-level failures.
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub duration_ms: i64,
    pub attempted_at: DateTime<Utc>,
}

/// New delivery attempt record for insertion.
#[derive(Debug, Clone)]
pub struct NewWebhookAttempt {
    pub task_id: String,
    pub attempt_number: i64,
    pub status_code: Option<u16>,
    pub error: Option<String>,
    pub duration_ms: i64,
}

/// Queue counts by status.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: i64,
    pub inflight: i64,
    pub completed: i64,
    pub failed: i64,
}

impl QueueStats {
    /// Total tasks across all statuses.
    pub fn total(&self) -> i64 {
        self.pending + self.inflight + self.completed + self.failed
    }
}
