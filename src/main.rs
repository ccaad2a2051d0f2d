use budget_ledger::config::{ServiceConfig, StoreConfig};
use budget_ledger::service::service::LedgerService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        eprintln!(
            "Usage: {} [--bind <addr:port>] [--store redis|memory] [--redis-url <url>]",
            args[0]
        );
        eprintln!("       [--api-prefix </v1>] [--key-prefix <banker>]");
        eprintln!("       [--save-interval-ms <1000>] [--save-timeout-ms <10000>]");
        eprintln!("Example: {} --bind 127.0.0.1:7001 --redis-url redis://127.0.0.1:6379/1", args[0]);
        std::process::exit(1);
    }

    let config = ServiceConfig::from_args(&args[1..])?;

    tracing::info!("Starting ledger shard on {}", config.bind);
    match &config.store {
        StoreConfig::Memory => tracing::info!("Store: in-memory"),
        StoreConfig::Redis { url } => tracing::info!("Store: redis at {}", url),
    }

    // 1. Store + service:
    let service = LedgerService::connect(config).await?;

    // 2. Initial load. A failed load leaves the ledger empty; the version
    //    checks keep the stored data safe from the empty ledger.
    let loaded = service.load().await;
    if !loaded.is_success() {
        tracing::error!(
            "Initial load failed ({:?}: {}), serving an empty ledger",
            loaded.status,
            loaded.info
        );
    }

    // 3. Periodic saves:
    let saver = service.spawn_save_loop();

    // 4. Start HTTP server:
    let bind = service.config().bind;
    tracing::info!("HTTP server listening on {}", bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, service.http_router())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 5. Final save:
    saver.abort();
    let _ = saver.await;
    match service.save().await {
        Some(result) if result.is_success() => tracing::info!("Final save complete"),
        Some(result) => tracing::error!("Final save failed: {:?} {}", result.status, result.info),
        None => tracing::warn!("Final save skipped, a save was still in flight"),
    }

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
