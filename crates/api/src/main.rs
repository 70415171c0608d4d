use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roadscan_api::config::ServerConfig;
use roadscan_api::router::build_app_router;
use roadscan_api::state::AppState;
use roadscan_api::{spool, ws};
use roadscan_core::demo::DemoRegistry;
use roadscan_events::NotificationBus;
use roadscan_ingest::media::FfmpegTools;
use roadscan_ingest::{IngestConfig, IngestManager};
use roadscan_remote::{HttpBackend, InMemoryBackend, SurveyBackend};

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "roadscan_api=debug,roadscan_ingest=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let ingest_config = IngestConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    spool::prepare_spool_dir(&config.spool_dir).await?;
    tracing::info!(dir = %config.spool_dir.display(), "Upload spool ready");

    // --- Remote backend ---
    let backend: Arc<dyn SurveyBackend> = match config.backend_url.as_deref() {
        Some(url) => {
            tracing::info!(url, "Using HTTP survey backend");
            Arc::new(HttpBackend::new(url))
        }
        None => {
            tracing::warn!("BACKEND_URL not set, using the in-memory backend");
            Arc::new(InMemoryBackend::new())
        }
    };

    // --- Ingestion services ---
    let bus = Arc::new(NotificationBus::default());
    let ingest = IngestManager::new(
        backend,
        Arc::new(FfmpegTools::default()),
        DemoRegistry::builtin(),
        bus,
        &ingest_config,
    );
    ingest.start_poller().await;
    tracing::info!("Ingest manager started");

    // --- WebSocket manager, heartbeat, forwarder ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let feed_cancel = CancellationToken::new();
    let heartbeat_handle = ws::start_heartbeat(
        Arc::clone(&ws_manager),
        Duration::from_secs(config.ws_heartbeat_secs),
        feed_cancel.clone(),
    );
    let forwarder_handle = ws::start_forwarder(
        Arc::clone(&ingest),
        Arc::clone(&ws_manager),
        feed_cancel.clone(),
    );

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        ingest: Arc::clone(&ingest),
        ws_manager: Arc::clone(&ws_manager),
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(addr = %listener.local_addr()?, "Starting server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    ingest
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await;

    feed_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), forwarder_handle).await;
    let _ = heartbeat_handle.await;

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining WebSocket connections");
    ws_manager.shutdown_all().await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM (on Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
