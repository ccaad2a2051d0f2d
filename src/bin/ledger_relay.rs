use budget_ledger::config::RelayConfig;
use budget_ledger::relay::handlers::relay_app;
use budget_ledger::relay::shard_relay::ShardRelay;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        eprintln!(
            "Usage: {} [--bind <addr:port>] [--relay-config <relay-config.json>]",
            args[0]
        );
        eprintln!("       [--api-prefix </v1>] [--min-connections <2>] [--max-uses <1000>]");
        eprintln!("       [--upstream-timeout-ms <30000>]");
        eprintln!("Example: {} --bind 0.0.0.0:8989 --relay-config shards.json", args[0]);
        std::process::exit(1);
    }

    let config = RelayConfig::from_args(&args[1..])?;

    tracing::info!("Starting ledger relay on {}", config.bind);
    tracing::info!(
        "Pool: min {} connections, recycled after {} uses",
        config.pool.min_connections,
        config.pool.max_uses_before_recycling
    );

    // 1. Shard table + pools:
    let relay = Arc::new(ShardRelay::new(&config)?);
    tracing::info!("Relaying to {} shards", relay.table().len());

    // 2. Spawn pool stats reporter:
    let stats_relay = relay.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(30));

        loop {
            interval.tick().await;
            for (slot, entry) in stats_relay.table().entries().iter().enumerate() {
                if let Some(pool) = stats_relay.pool(slot) {
                    let stats = pool.stats();
                    tracing::info!(
                        "  - shard {} {} live={} free={} created={} recycled={}",
                        entry.shard_id,
                        entry.endpoint,
                        stats.live,
                        stats.free,
                        stats.created,
                        stats.recycled
                    );
                }
            }
        }
    });

    // 3. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    axum::serve(listener, relay_app(relay))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
