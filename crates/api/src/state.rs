use std::sync::Arc;

use roadscan_ingest::IngestManager;

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Ingestion facade owning the record store and background tasks.
    pub ingest: Arc<IngestManager>,
    /// WebSocket connection manager (browser clients).
    pub ws_manager: Arc<WsManager>,
}
