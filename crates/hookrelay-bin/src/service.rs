//! Foreground delivery service.

use hookrelay_core::{Config, Paths};
use hookrelay_database::AsyncDatabase;
use hookrelay_outbox::{
    BackoffPolicy, Dispatcher, DispatcherConfig, HttpSender, SenderConfig, WebhookQueue,
};
use tracing::{error, info};

/// Run the delivery service until interrupted.
///
/// Opens the store, recovers tasks left inflight by a previous run, then
/// processes one batch of due tasks per poll tick until Ctrl-C.
pub async fn run(config: Config, paths: Paths) -> anyhow::Result<()> {
    paths.ensure_dirs()?;

    let db_path = paths.database_file();
    info!(path = %db_path.display(), "Opening webhook store");
    let db = AsyncDatabase::open(&db_path).await?;

    let queue = WebhookQueue::new(db.clone())
        .with_default_max_attempts(config.default_max_attempts as i64);
    queue.recover().await?;

    let sender = HttpSender::new(SenderConfig {
        timeout_secs: config.request_timeout_secs,
    });
    let dispatcher = Dispatcher::new(
        queue,
        sender,
        DispatcherConfig {
            batch_limit: config.batch_limit as i64,
            backoff: BackoffPolicy::new(config.backoff_table()),
        },
    );

    info!(
        poll_interval_ms = config.poll_interval_ms,
        batch_limit = config.batch_limit,
        request_timeout_secs = config.request_timeout_secs,
        "Webhook delivery service started"
    );

    let mut ticker = tokio::time::interval(config.poll_interval());

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = dispatcher.process_pending_batch().await {
                    error!(error = %e, "Batch processing failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    db.close().await?;
    info!("Webhook delivery service stopped");

    Ok(())
}
