//! Operator commands that work directly on the webhook store.

use crate::output::{print_divider, print_heading, print_row};
use anyhow::Result;
use chrono::{DateTime, Utc};
use hookrelay_core::{Config, Paths};
use hookrelay_database::{AsyncDatabase, TaskStatus, WebhookTask};
use hookrelay_outbox::{EnqueueOptions, WebhookQueue};
use std::time::Duration;

async fn open_queue(paths: &Paths, config: &Config) -> Result<WebhookQueue> {
    paths.ensure_dirs()?;
    let db = AsyncDatabase::open(&paths.database_file()).await?;
    Ok(WebhookQueue::new(db).with_default_max_attempts(config.default_max_attempts as i64))
}

fn parse_status(value: &str) -> Result<TaskStatus> {
    match value {
        "pending" => Ok(TaskStatus::Pending),
        "inflight" => Ok(TaskStatus::Inflight),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        other => anyhow::bail!(
            "Unknown status '{}'. Expected pending, inflight, completed, or failed",
            other
        ),
    }
}

fn format_time(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Enqueue a webhook delivery.
pub async fn enqueue(
    paths: &Paths,
    config: &Config,
    url: &str,
    payload: &str,
    max_attempts: Option<i64>,
    delay_ms: Option<u64>,
) -> Result<()> {
    let payload: serde_json::Value = serde_json::from_str(payload)
        .map_err(|e| anyhow::anyhow!("Invalid JSON payload: {}", e))?;

    let queue = open_queue(paths, config).await?;
    let id = queue
        .enqueue(
            url,
            &payload,
            EnqueueOptions {
                max_attempts,
                initial_delay: delay_ms.map(Duration::from_millis),
            },
        )
        .await?;

    let task = queue.get_required(&id).await?;
    println!("Enqueued webhook task {}", id);
    print_row("Target", &task.target_url);
    print_row("Max attempts", &task.max_attempts.to_string());
    print_row("Next attempt", &format_time(&task.next_attempt_at));

    Ok(())
}

/// Show queue counts by status.
pub async fn status(paths: &Paths, config: &Config) -> Result<()> {
    let queue = open_queue(paths, config).await?;
    let stats = queue.stats().await?;

    print_heading("Queue Status");
    print_row("Pending", &stats.pending.to_string());
    print_row("Inflight", &stats.inflight.to_string());
    print_row("Completed", &stats.completed.to_string());
    print_row("Failed", &stats.failed.to_string());
    print_row("Total", &stats.total().to_string());

    Ok(())
}

/// List recent tasks, optionally filtered by status.
pub async fn list(
    paths: &Paths,
    config: &Config,
    status: Option<&str>,
    limit: i64,
) -> Result<()> {
    let filter = match status {
        Some(value) => Some(parse_status(value)?),
        None => None,
    };

    let queue = open_queue(paths, config).await?;
    let tasks = queue.list(filter, limit).await?;

    if tasks.is_empty() {
        println!("No tasks found");
        return Ok(());
    }

    println!(
        "{:<36} {:<10} {:<9} {:<20} {}",
        "ID", "Status", "Attempts", "Next Attempt", "Target"
    );
    print_divider(100);
    for task in &tasks {
        println!(
            "{:<36} {:<10} {:<9} {:<20} {}",
            task.id,
            task.status.as_str(),
            format!("{}/{}", task.attempts, task.max_attempts),
            format_time(&task.next_attempt_at),
            task.target_url
        );
    }

    Ok(())
}

/// Show one task and its delivery history.
pub async fn show(paths: &Paths, config: &Config, id: &str) -> Result<()> {
    let queue = open_queue(paths, config).await?;
    let task = queue.get_required(id).await?;

    print_task_details(&task);

    let attempts = queue.attempts(id).await?;
    print_heading("Delivery Attempts");
    if attempts.is_empty() {
        println!("  No attempts recorded");
        return Ok(());
    }

    println!(
        "  {:<4} {:<8} {:<10} {:<20} {}",
        "#", "Status", "Duration", "At", "Error"
    );
    for attempt in &attempts {
        let status = match attempt.status_code {
            Some(code) => code.to_string(),
            None => "-".to_string(),
        };
        println!(
            "  {:<4} {:<8} {:<10} {:<20} {}",
            attempt.attempt_number,
            status,
            format!("{}ms", attempt.duration_ms),
            format_time(&attempt.attempted_at),
            attempt.error.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

fn print_task_details(task: &WebhookTask) {
    print_heading("Task Details");
    print_row("ID", &task.id);
    print_row("Target", &task.target_url);
    print_row("Status", task.status.as_str());
    print_row(
        "Attempts",
        &format!("{} of {}", task.attempts, task.max_attempts),
    );
    print_row("Next attempt", &format_time(&task.next_attempt_at));
    print_row("Last error", task.last_error.as_deref().unwrap_or("-"));
    print_row("Created", &format_time(&task.created_at));
    print_row("Updated", &format_time(&task.updated_at));
    match &task.completed_at {
        Some(time) => print_row("Completed", &format_time(time)),
        None => print_row("Completed", "-"),
    }
    print_row("Payload", &task.payload);
}

/// Return a failed task to the queue with a fresh attempt budget.
pub async fn requeue(paths: &Paths, config: &Config, id: &str) -> Result<()> {
    let queue = open_queue(paths, config).await?;
    queue.get_required(id).await?;

    if queue.requeue(id).await? {
        println!("Task {} requeued", id);
    } else {
        println!("Task {} is not failed; only failed tasks can be requeued", id);
    }

    Ok(())
}
