//! The [`SurveyBackend`] seam and its error type.

use std::path::Path;

use async_trait::async_trait;

use roadscan_core::types::{BackendId, SurveyId};

use crate::types::{
    AssetRecord, Detection, LibraryCopy, NewSurvey, NewVideo, ProgressFn, RemoteVideo,
    StartProcessing, StatusUpdate, UploadOutcome,
};

/// Errors from the remote backend layer.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The backend returned a non-2xx status code.
    #[error("Backend API error ({status}): {body}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// Reading a local file for upload failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
}

/// Operations the orchestrator needs from the remote survey backend.
///
/// Every method is a suspension point; none of them carries a timeout of
/// its own.
#[async_trait]
pub trait SurveyBackend: Send + Sync {
    async fn create_survey(&self, survey: &NewSurvey) -> Result<SurveyId, RemoteError>;

    async fn delete_survey(&self, survey_id: &str) -> Result<(), RemoteError>;

    async fn create_video(&self, video: &NewVideo) -> Result<BackendId, RemoteError>;

    async fn update_video_status(
        &self,
        video_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), RemoteError>;

    async fn get_video(&self, video_id: &str) -> Result<RemoteVideo, RemoteError>;

    /// Transfer the file at `source` (`size` bytes), calling `on_progress`
    /// with non-decreasing byte counts as the transfer advances.
    async fn upload_video(
        &self,
        video_id: &str,
        source: &Path,
        size: u64,
        on_progress: ProgressFn,
    ) -> Result<UploadOutcome, RemoteError>;

    /// Store a JPEG thumbnail and return its public URL.
    async fn upload_thumbnail(&self, video_id: &str, jpeg: Vec<u8>)
        -> Result<String, RemoteError>;

    async fn upload_gpx(
        &self,
        video_id: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<(), RemoteError>;

    async fn copy_from_library(&self, request: &LibraryCopy)
        -> Result<UploadOutcome, RemoteError>;

    async fn start_ai_processing(&self, video_id: &str) -> Result<StartProcessing, RemoteError>;

    /// Insert asset rows; returns how many were stored.
    async fn bulk_insert_assets(&self, assets: &[AssetRecord]) -> Result<usize, RemoteError>;

    /// Load a canned detection dataset. `Ok(None)` when the key is unknown.
    async fn load_demo_detections(&self, key: &str)
        -> Result<Option<Vec<Detection>>, RemoteError>;
}
