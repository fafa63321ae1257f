//! hookrelay - Durable webhook delivery service and operator CLI.

mod commands;
mod output;
mod service;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hookrelay_core::{init_logging, Config, Paths};

/// hookrelay command-line interface.
#[derive(Parser)]
#[command(name = "hookrelay")]
#[command(about = "Durable webhook delivery with automatic retries")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error). Overrides the config file.
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Base directory for runtime files (database, config). Defaults to ~/.hookrelay
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the delivery service in the foreground
    Run,
    /// Enqueue a webhook delivery
    Enqueue {
        /// Target URL to POST the payload to
        #[arg(short, long)]
        url: String,
        /// JSON payload to deliver
        #[arg(short, long)]
        payload: String,
        /// Attempt ceiling for this task
        #[arg(long)]
        max_attempts: Option<i64>,
        /// Delay in milliseconds before the first attempt
        #[arg(long)]
        delay_ms: Option<u64>,
    },
    /// Show queue counts by status
    Status,
    /// List recent tasks
    List {
        /// Filter by status (pending, inflight, completed, failed)
        #[arg(short, long)]
        status: Option<String>,
        /// Maximum number of tasks to show
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
    /// Show one task and its delivery history
    Show {
        /// Task ID
        id: String,
    },
    /// Return a failed task to the queue with a fresh attempt budget
    Requeue {
        /// Task ID
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    let config = Config::load(&paths)?;

    let log_level = cli
        .log_level
        .unwrap_or_else(|| config.log_level.clone());
    init_logging(&log_level);

    match cli.command {
        Some(Commands::Run) | None => {
            service::run(config, paths).await?;
        }
        Some(Commands::Enqueue {
            url,
            payload,
            max_attempts,
            delay_ms,
        }) => {
            commands::enqueue(&paths, &config, &url, &payload, max_attempts, delay_ms).await?;
        }
        Some(Commands::Status) => {
            commands::status(&paths, &config).await?;
        }
        Some(Commands::List { status, limit }) => {
            commands::list(&paths, &config, status.as_deref(), limit).await?;
        }
        Some(Commands::Show { id }) => {
            commands::show(&paths, &config, &id).await?;
        }
        Some(Commands::Requeue { id }) => {
            commands::requeue(&paths, &config, &id).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_enqueue_command() {
        let cli = Cli::try_parse_from([
            "hookrelay",
            "enqueue",
            "--url",
            "https://example.com/hook",
            "--payload",
            r#"{"event":"ping"}"#,
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Enqueue {
                url,
                payload,
                max_attempts,
                delay_ms,
            }) => {
                assert_eq!(url, "https://example.com/hook");
                assert_eq!(payload, r#"{"event":"ping"}"#);
                assert_eq!(max_attempts, None);
                assert_eq!(delay_ms, None);
            }
            _ => panic!("Expected Enqueue command"),
        }
    }

    #[test]
    fn test_parse_list_defaults() {
        let cli = Cli::try_parse_from(["hookrelay", "list"]).unwrap();
        match cli.command {
            Some(Commands::List { status, limit }) => {
                assert_eq!(status, None);
                assert_eq!(limit, 20);
            }
            _ => panic!("Expected List command"),
        }
    }

    #[test]
    fn test_no_subcommand_defaults_to_run() {
        let cli = Cli::try_parse_from(["hookrelay"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.base_dir.is_none());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["hookrelay", "status", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Some(Commands::Status) => {}
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_requeue_requires_id() {
        assert!(Cli::try_parse_from(["hookrelay", "requeue"]).is_err());
        let cli = Cli::try_parse_from(["hookrelay", "requeue", "abc-123"]).unwrap();
        match cli.command {
            Some(Commands::Requeue { id }) => assert_eq!(id, "abc-123"),
            _ => panic!("Expected Requeue command"),
        }
    }
}
