//! Thumbnail Deriver.
//!
//! Seeks to `min(max_offset, duration)`, captures a JPEG frame and stores
//! it on the backend. Callers treat every failure here as non-fatal.

use std::path::Path;
use std::sync::Arc;

use roadscan_core::ffmpeg::thumbnail_offset;
use roadscan_remote::{RemoteError, SurveyBackend};

use crate::media::{MediaError, MediaTools};

#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("Frame capture failed: {0}")]
    Media(#[from] MediaError),

    #[error("Thumbnail upload failed: {0}")]
    Remote(#[from] RemoteError),
}

pub struct ThumbnailDeriver {
    media: Arc<dyn MediaTools>,
    backend: Arc<dyn SurveyBackend>,
    max_offset_secs: f64,
}

impl ThumbnailDeriver {
    pub fn new(
        media: Arc<dyn MediaTools>,
        backend: Arc<dyn SurveyBackend>,
        max_offset_secs: f64,
    ) -> Self {
        Self {
            media,
            backend,
            max_offset_secs,
        }
    }

    /// Capture and upload a thumbnail, returning the stored URL.
    pub async fn derive(
        &self,
        source: &Path,
        duration_secs: f64,
        backend_id: &str,
    ) -> Result<String, ThumbnailError> {
        let offset = thumbnail_offset(duration_secs, self.max_offset_secs);
        let jpeg = self.media.capture_frame(source, offset).await?;
        let url = self.backend.upload_thumbnail(backend_id, jpeg).await?;
        tracing::debug!(backend_id, offset, url = %url, "Thumbnail stored");
        Ok(url)
    }
}
