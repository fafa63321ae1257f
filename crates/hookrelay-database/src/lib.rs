//! SQLite persistence layer for hookrelay.
//!
//! This crate provides:
//! - Async SQLite executor with a dedicated thread
//! - Database migrations
//! - Model types for webhook tasks and delivery attempts
//! - Query helpers for queue state transitions
//!
//! # Architecture
//!
//! The `AsyncDatabase` uses a single dedicated thread for all SQLite
//! operations. Queries are sent through a channel and executed in FIFO
//! order, which also serializes all queue state transitions.
//!
//! ```ignore
//! let db = AsyncDatabase::open(path).await?;
//! let due = db.call(|conn| queries::claim_due(conn, 100, Utc::now())).await?;
//! ```
//!
//! Status transitions are conditional single-statement updates guarded on
//! non-terminal status, so a completed or failed task can never be revived
//! by a stale dispatcher.

mod error;
mod executor;
mod migrations;
mod models;
pub mod queries;

pub use error::{DatabaseError, DatabaseResult};
pub use executor::AsyncDatabase;
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::*;
