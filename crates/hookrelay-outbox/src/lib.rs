//! Durable webhook delivery over the SQLite store.
//!
//! This crate provides:
//! - WebhookQueue: Durable task queue with claim, retry, and recovery
//! - HttpSender: HTTP POST delivery with a bounded per-request timeout
//! - Dispatcher: Concurrent batch processing of due tasks
//! - BackoffPolicy: Fixed table of retry delays

mod backoff;
mod dispatcher;
mod error;
mod queue;
mod sender;

pub use backoff::{BackoffPolicy, DEFAULT_BACKOFF_TABLE};
pub use dispatcher::{BatchSummary, Dispatcher, DispatcherConfig};
pub use error::{OutboxError, OutboxResult};
pub use queue::{EnqueueOptions, WebhookQueue, DEFAULT_MAX_ATTEMPTS};
pub use sender::{DeliveryOutcome, HttpSender, SenderConfig, ATTEMPT_HEADER, TASK_ID_HEADER};
