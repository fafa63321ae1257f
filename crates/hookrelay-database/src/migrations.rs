//! Database migrations.
//!
//! This module contains all SQL migrations for the database schema.
//! Migrations are run in order and tracked in the `migrations` table.

use crate::DatabaseResult;
use rusqlite::Connection;
use tracing::{debug, info};

/// Current schema version.
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations.
pub fn run_migrations(conn: &Connection) -> DatabaseResult<()> {
    // Create migrations tracking table
    conn.execute(
        "CREATE TABLE IF NOT EXISTS migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM migrations",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    info!(current_version, target_version = CURRENT_VERSION, "Running migrations");

    if current_version < 1 {
        migrate_v1_webhook_tasks(conn)?;
    }
    if current_version < 2 {
        migrate_v2_webhook_attempts(conn)?;
    }

    info!("Migrations complete");
    Ok(())
}

fn record_migration(conn: &Connection, version: i32, name: &str) -> DatabaseResult<()> {
    conn.execute(
        "INSERT INTO migrations (version, name) VALUES (?1, ?2)",
        rusqlite::params![version, name],
    )?;
    debug!(version, name, "Migration applied");
    Ok(())
}

/// V1: Webhook task queue.
fn migrate_v1_webhook_tasks(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v1: webhook tasks");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS webhook_tasks (
            id TEXT PRIMARY KEY,
            target_url TEXT NOT NULL,
            payload TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL DEFAULT 5,
            status TEXT NOT NULL DEFAULT 'pending',
            last_error TEXT,
            next_attempt_at TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            completed_at TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_webhook_tasks_status_next_attempt
            ON webhook_tasks(status, next_attempt_at);
        CREATE INDEX IF NOT EXISTS idx_webhook_tasks_created_at
            ON webhook_tasks(created_at);
        ",
    )?;

    record_migration(conn, 1, "webhook_tasks")?;
    Ok(())
}

/// V2: Per-attempt delivery history.
fn migrate_v2_webhook_attempts(conn: &Connection) -> DatabaseResult<()> {
    info!("Applying migration v2: webhook attempts");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS webhook_attempts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            task_id TEXT NOT NULL REFERENCES webhook_tasks(id) ON DELETE CASCADE,
            attempt_number INTEGER NOT NULL,
            status_code INTEGER,
            error TEXT,
            duration_ms INTEGER NOT NULL DEFAULT 0,
            attempted_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_webhook_attempts_task_id
            ON webhook_attempts(task_id);
        ",
    )?;

    record_migration(conn, 2, "webhook_attempts")?;
    Ok(())
}
