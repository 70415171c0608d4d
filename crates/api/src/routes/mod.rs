pub mod health;
pub mod videos;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                  WebSocket (snapshots + notifications)
///
/// /videos                              list records (GET)
/// /videos/upload                       multipart batch upload (POST)
/// /videos/library                      library import (POST)
/// /videos/{local_id}                   remove (DELETE)
/// /videos/{local_id}/retry             retry upload (POST, always 501)
/// /videos/{local_id}/gpx               attach GPS track (POST, multipart)
/// /videos/{local_id}/process           start AI processing (POST)
/// /videos/{local_id}/reset             reset status (POST)
/// /videos/{local_id}/detections        cached demo detections (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .nest("/videos", videos::router())
}
