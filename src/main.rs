use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use chanrag_backend::core::config::{AppPaths, ConfigService};
use chanrag_backend::core::logging;
use chanrag_backend::server::router::router;
use chanrag_backend::state::AppState;

const EVENT_QUEUE_CAPACITY: usize = 256;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let paths = AppPaths::new();
    logging::init(&paths);

    let settings = ConfigService::load(&paths.config_path)
        .with_context(|| format!("Failed to load config {}", paths.config_path.display()))?;
    tracing::info!(config = %ConfigService::redacted(&settings), "Configuration loaded");

    let state = AppState::initialize(&paths, settings).await?;

    if let Err(err) = state.indexer.ensure_index().await {
        tracing::warn!("Failed to configure search index: {}", err);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);

    match state.telegram_poller()? {
        Some(poller) => {
            tokio::spawn(poller.run(events_tx, shutdown_rx.clone()));
        }
        None => {
            tracing::warn!("TG_BOT_TOKEN not set; ingestion is idle");
            drop(events_tx);
        }
    }

    let dispatcher = state.dispatcher();
    let listener_shutdown = shutdown_rx.clone();
    let ingestion = tokio::spawn(async move {
        dispatcher.run(events_rx, listener_shutdown).await;
    });

    let server = &state.settings.server;
    let bind_addr = format!("{}:{}", server.bind_addr, server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on {}", addr);

    let app: Router = router(state.clone());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = ingestion.await {
        tracing::warn!("Ingestion listener ended abnormally: {}", err);
    }
    tracing::info!("Shutdown complete");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
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

    tracing::info!("Shutdown signal received");
}
