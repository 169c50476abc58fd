#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use offload_core::{
    pool::WorkerPool,
    store::{MemoryStore, SqliteStore, UserStore},
};
use server::config::{CliArgs, ServerConfig, StoreBackend};
use server::service::{handler::AppState, router::router};
use server::telemetry::init_telemetry;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    init_telemetry(config.log_format)?;

    // The store must be usable before the first request is accepted.
    let store = user_store(&config)?;
    store.initialize().await?;

    let pool = Arc::new(WorkerPool::new(config.pool.clone()));
    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config);

    let app = router(AppState::new(config, Arc::clone(&pool), Arc::clone(&store)));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&pool)))
        .await?;

    if let Err(e) = store.close().await {
        tracing::error!("Error closing user store: {e}");
    }

    tracing::info!("Service shut down successfully");
    Ok(())
}

fn user_store(config: &ServerConfig) -> anyhow::Result<Arc<dyn UserStore>> {
    let store: Arc<dyn UserStore> = match config.user_store {
        StoreBackend::Sqlite => Arc::new(
            SqliteStore::from_url(&config.database_url)?
                .with_max_connections(config.database_max_connections),
        ),
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting offload service on {} with full config: {:#?}",
            config.server_addr,
            config
        );
    } else {
        tracing::info!(
            "Starting offload service on {} with a cap of {:?} workers and a {:?} user store",
            config.server_addr,
            config.pool.max_workers,
            config.user_store
        );
    }
}

async fn shutdown_signal(pool: Arc<WorkerPool>) {
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");

    // Resolves outstanding awaits so in-flight requests can complete.
    if let Err(e) = pool.shutdown().await {
        tracing::error!("Error during worker pool shutdown: {e:?}");
    }
}
