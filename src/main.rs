use std::sync::Arc;
use std::sync::atomic::Ordering;

use postbeam::config::PostbeamConfig;
use postbeam::delivery::TelegramAdapter;
use postbeam::dispatch::Dispatcher;
use postbeam::flows::FlowEngine;
use postbeam::ops::Ops;
use postbeam::store::LibSqlBackend;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = PostbeamConfig::from_env();

    let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").unwrap_or_else(|_| {
        eprintln!("Error: TELEGRAM_BOT_TOKEN not set");
        eprintln!("  export TELEGRAM_BOT_TOKEN=123456:ABC-...");
        std::process::exit(1);
    });

    eprintln!("📮 Postbeam v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Dispatch: every {}s, {} concurrent, {}s timeout\n",
        config.poll_interval.as_secs(),
        config.max_concurrent_deliveries,
        config.delivery_timeout.as_secs()
    );

    // ── Database ────────────────────────────────────────────────────
    let repo = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {}",
                    config.db_path.display(),
                    e
                );
                std::process::exit(1);
            }),
    );

    // ── Delivery & engines ──────────────────────────────────────────
    let adapter = Arc::new(TelegramAdapter::new(bot_token));

    let _flows = Arc::new(FlowEngine::new(repo.clone(), adapter.clone()));
    let _ops = Arc::new(Ops::new(
        repo.clone(),
        adapter.clone(),
        config.event_log_limit,
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        repo,
        adapter.clone(),
        adapter,
        config,
    ));
    let (dispatch_handle, dispatch_shutdown) = dispatcher.spawn();

    // The presentation layer (bot UI) plugs into `_flows` and `_ops`; the
    // dispatch loop runs regardless of it.
    tracing::info!("Postbeam running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down");
    dispatch_shutdown.store(true, Ordering::Relaxed);
    dispatch_handle.abort();

    Ok(())
}
