//! Core types, configuration, and utilities shared across hookrelay.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_BACKOFF_TABLE_MS, DEFAULT_BATCH_LIMIT, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_ATTEMPTS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
