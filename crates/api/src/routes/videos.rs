//! Route definitions for the `/videos` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::videos;
use crate::state::AppState;

/// Routes mounted at `/videos`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(videos::list_videos))
        .route("/upload", post(videos::upload_videos))
        .route("/library", post(videos::import_from_library))
        .route("/{local_id}", delete(videos::remove_video))
        .route("/{local_id}/retry", post(videos::retry_upload))
        .route("/{local_id}/gpx", post(videos::attach_gpx))
        .route("/{local_id}/process", post(videos::process_video))
        .route("/{local_id}/reset", post(videos::reset_video))
        .route("/{local_id}/detections", get(videos::demo_detections))
}
