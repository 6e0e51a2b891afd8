use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tokio::signal;
use tracing::{error, info, warn};

use fraudgate::api::{create_router, AppState};
use fraudgate::app::Services;
use fraudgate::audit::TracingAuditSink;
use fraudgate::config::Config;
use fraudgate::feed;
use fraudgate::observability::{init_tracing, install_prometheus};
use fraudgate::policy::{PolicyLoader, PolicyWatcher};
use fraudgate::storage::{PostgresStore, Stores};
use fraudgate::velocity::spawn_counter_sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level, config.log_json);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting fraudgate"
    );

    let metrics = if config.metrics_enabled {
        Some(install_prometheus()?)
    } else {
        info!("Metrics disabled");
        None
    };

    // Storage
    let (stores, database) = match config.database_url.as_deref() {
        Some(url) => {
            let store = Arc::new(
                PostgresStore::connect(
                    url,
                    config.db_min_connections,
                    config.db_max_connections,
                    Duration::from_secs(5),
                )
                .await?,
            );
            store.run_migrations().await?;
            info!("Using PostgreSQL storage");
            (Stores::postgres(store.clone()), Some(store))
        }
        None => {
            warn!("No database configured, using in-memory storage");
            (Stores::memory().0, None)
        }
    };

    // Load initial policy; a bad file degrades to the empty rule set
    let policy = Arc::new(PolicyWatcher::load(PolicyLoader::new(
        config.policy_path.clone(),
    )));
    let policy_handle = if config.policy_reload_secs > 0 {
        Some(policy.clone().spawn(config.policy_reload_interval()))
    } else {
        info!("Policy watcher disabled");
        None
    };

    let sweeper_handle = if config.counter_sweep_secs > 0 {
        Some(spawn_counter_sweeper(
            stores.counters.clone(),
            config.counter_sweep_interval(),
        ))
    } else {
        info!("Counter sweeper disabled");
        None
    };

    let services = Services::build(
        stores,
        policy,
        config.velocity(),
        config.event_deadline(),
        Arc::new(TracingAuditSink),
    )?;

    // Feed consumer
    let (producer, consumer) = feed::channel(services.pipeline.clone(), config.feed());
    let consumer_handle = tokio::spawn(consumer.run());

    // Create application state
    let state = Arc::new(AppState {
        services,
        feed: producer,
        database,
        metrics,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    // Create router
    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    // The router owned the last producer; the consumer drains and stops.
    info!("Shutting down...");
    for handle in [policy_handle, sweeper_handle].into_iter().flatten() {
        handle.abort();
    }

    match tokio::time::timeout(config.shutdown_timeout(), consumer_handle).await {
        Ok(Ok(stats)) => info!(
            acked = stats.acked,
            dead_lettered = stats.dead_lettered,
            "Feed drained"
        ),
        Ok(Err(e)) => error!(error = %e, "Feed consumer task failed"),
        Err(_) => warn!("Feed did not drain before the shutdown timeout"),
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
