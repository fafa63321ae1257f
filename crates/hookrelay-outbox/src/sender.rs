//! HTTP delivery of webhook payloads.

use hookrelay_database::WebhookTask;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Header carrying the task id on every delivery request.
pub const TASK_ID_HEADER: &str = "x-hookrelay-task-id";
/// Header carrying the 1-indexed attempt number.
pub const ATTEMPT_HEADER: &str = "x-hookrelay-attempt";

/// Configuration for the HTTP sender.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Whole-request timeout in seconds. A timed out attempt counts as a
    /// failed attempt like any other.
    pub timeout_secs: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Outcome of one delivery attempt.
///
/// Transport errors are outcomes rather than errors: the dispatcher treats
/// them the same as a rejecting status, so they must not short-circuit a
/// batch through `?`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The target answered with a 2xx status.
    Delivered { status: u16 },
    /// The target answered with a non-2xx status.
    Rejected { status: u16 },
    /// No response was produced (connect error, timeout, DNS failure).
    TransportError { message: String },
}

impl DeliveryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// HTTP status code, when the target produced a response.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Delivered { status } | Self::Rejected { status } => Some(*status),
            Self::TransportError { .. } => None,
        }
    }

    /// Failure description suitable for the task's last error field.
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::Delivered { .. } => None,
            Self::Rejected { status } => Some(format!("HTTP {}", status)),
            Self::TransportError { message } => Some(message.clone()),
        }
    }
}

/// HTTP sender that POSTs webhook payloads to their target URLs.
pub struct HttpSender {
    client: Client,
}

impl HttpSender {
    /// Create a new sender with the given configuration.
    pub fn new(config: SenderConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    /// Deliver one task's payload.
    ///
    /// POSTs the stored payload verbatim as the request body, tagged with
    /// the task id and the attempt number about to be made. Every way the
    /// request can end maps to an outcome.
    pub async fn deliver(&self, task: &WebhookTask) -> DeliveryOutcome {
        let attempt_number = task.attempts + 1;

        debug!(
            task_id = %task.id,
            target_url = %task.target_url,
            attempt = attempt_number,
            "Delivering webhook"
        );

        let result = self
            .client
            .post(&task.target_url)
            .header("content-type", "application/json")
            .header(TASK_ID_HEADER, task.id.as_str())
            .header(ATTEMPT_HEADER, attempt_number.to_string())
            .body(task.payload.clone())
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status().as_u16();
                if response.status().is_success() {
                    DeliveryOutcome::Delivered { status }
                } else {
                    DeliveryOutcome::Rejected { status }
                }
            }
            Err(e) => {
                warn!(
                    task_id = %task.id,
                    target_url = %task.target_url,
                    error = %e,
                    "Webhook delivery did not reach the target"
                );
                DeliveryOutcome::TransportError {
                    message: e.to_string(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use hookrelay_database::TaskStatus;

    fn test_task(target_url: &str, attempts: i64) -> WebhookTask {
        let now = Utc::now();
        WebhookTask {
            id: "task-1".to_string(),
            target_url: target_url.to_string(),
            payload: r#"{"event":"ping"}"#.to_string(),
            attempts,
            max_attempts: 5,
            status: TaskStatus::Inflight,
            last_error: None,
            next_attempt_at: now,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[test]
    fn test_sender_config_default() {
        let config = SenderConfig::default();
        assert_eq!(config.timeout_secs, 30);
    }

    #[test]
    fn test_outcome_accessors() {
        let delivered = DeliveryOutcome::Delivered { status: 204 };
        assert!(delivered.is_success());
        assert_eq!(delivered.status_code(), Some(204));
        assert_eq!(delivered.error_message(), None);

        let rejected = DeliveryOutcome::Rejected { status: 503 };
        assert!(!rejected.is_success());
        assert_eq!(rejected.status_code(), Some(503));
        assert_eq!(rejected.error_message().as_deref(), Some("HTTP 503"));

        let transport = DeliveryOutcome::TransportError {
            message: "connection refused".to_string(),
        };
        assert!(!transport.is_success());
        assert_eq!(transport.status_code(), None);
        assert_eq!(
            transport.error_message().as_deref(),
            Some("connection refused")
        );
    }

    #[tokio::test]
    async fn test_deliver_posts_payload_with_headers() {
        use axum::extract::State;
        use axum::http::{HeaderMap, StatusCode};
        use axum::routing::post;
        use axum::Router;
        use std::sync::{Arc, Mutex};

        let seen: Arc<Mutex<Vec<(HeaderMap, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/hook",
                post(
                    |State(seen): State<Arc<Mutex<Vec<(HeaderMap, String)>>>>,
                     headers: HeaderMap,
                     body: String| async move {
                        seen.lock().unwrap().push((headers, body));
                        StatusCode::OK
                    },
                ),
            )
            .with_state(seen.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sender = HttpSender::new(SenderConfig::default());
        let task = test_task(&format!("http://{}/hook", addr), 2);

        let outcome = sender.deliver(&task).await;
        assert_eq!(outcome, DeliveryOutcome::Delivered { status: 200 });

        let requests = seen.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let (headers, body) = &requests[0];
        assert_eq!(body, r#"{"event":"ping"}"#);
        assert_eq!(headers.get(TASK_ID_HEADER).unwrap(), "task-1");
        // Third attempt for a task that already has two recorded.
        assert_eq!(headers.get(ATTEMPT_HEADER).unwrap(), "3");
        assert_eq!(headers.get("content-type").unwrap(), "application/json");
    }

    #[tokio::test]
    async fn test_deliver_maps_rejection_status() {
        use axum::http::StatusCode;
        use axum::routing::post;
        use axum::Router;

        let app = Router::new().route(
            "/hook",
            post(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let sender = HttpSender::new(SenderConfig::default());
        let task = test_task(&format!("http://{}/hook", addr), 0);

        let outcome = sender.deliver(&task).await;
        assert_eq!(outcome, DeliveryOutcome::Rejected { status: 500 });
    }

    #[tokio::test]
    async fn test_deliver_maps_connection_failure_to_transport_error() {
        // Bind then drop a listener so the port is known to refuse.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let sender = HttpSender::new(SenderConfig::default());
        let task = test_task(&format!("http://{}/hook", addr), 0);

        let outcome = sender.deliver(&task).await;
        assert!(matches!(outcome, DeliveryOutcome::TransportError { .. }));
        assert_eq!(outcome.status_code(), None);
        assert!(outcome.error_message().is_some());
    }
}
