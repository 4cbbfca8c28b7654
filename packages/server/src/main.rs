use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use docstore_common::storage::open_blob_store;
use docstore_server::config::AppConfig;
use docstore_server::documents::SeaOrmMetadataStore;
use docstore_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::load()?;

    let db = docstore_server::database::init_db(&config.database.url).await?;
    docstore_server::database::ensure_indexes(&db).await?;
    info!("Database ready");

    let blobs = open_blob_store(&config.storage).await?;
    info!(backend = ?config.storage.backend, "Blob store ready");

    let metadata = Arc::new(SeaOrmMetadataStore::new(db));
    let state = AppState::new(config.clone(), blobs, metadata);

    let sweeper = if config.reconcile.interval_secs > 0 {
        let interval = Duration::from_secs(config.reconcile.interval_secs);
        info!(interval_secs = config.reconcile.interval_secs, "Starting reconciler");
        Some(state.reconciler.clone().spawn(interval))
    } else {
        warn!("Background reconciliation disabled");
        None
    };

    let app = docstore_server::build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Server running at http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = sweeper {
        handle.abort();
    }
    info!("Server shut down");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received SIGINT"),
        () = terminate => info!("Received SIGTERM"),
    }
}
