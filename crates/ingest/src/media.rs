//! Local media inspection: duration probing and frame capture.
//!
//! [`MediaTools`] is the seam between the orchestrator and the FFmpeg
//! binaries so tests can run without them installed.

use std::io::Cursor;
use std::path::Path;

use async_trait::async_trait;
use image::ImageReader;

use roadscan_core::ffmpeg::{self, FfmpegError, DEFAULT_THUMBNAIL_WIDTH};

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error(transparent)]
    Ffmpeg(#[from] FfmpegError),

    #[error("Captured frame is not a readable image: {0}")]
    Image(#[from] image::ImageError),

    #[error("Captured frame is empty")]
    EmptyFrame,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local operations on a video file.
#[async_trait]
pub trait MediaTools: Send + Sync {
    /// Duration in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError>;

    /// Capture one frame at `offset_secs` and return it as JPEG bytes.
    async fn capture_frame(&self, path: &Path, offset_secs: f64) -> Result<Vec<u8>, MediaError>;
}

/// [`MediaTools`] backed by the `ffprobe` and `ffmpeg` binaries on `PATH`.
#[derive(Debug, Clone)]
pub struct FfmpegTools {
    thumbnail_width: u32,
}

impl FfmpegTools {
    pub fn new(thumbnail_width: u32) -> Self {
        Self { thumbnail_width }
    }
}

impl Default for FfmpegTools {
    fn default() -> Self {
        Self::new(DEFAULT_THUMBNAIL_WIDTH)
    }
}

#[async_trait]
impl MediaTools for FfmpegTools {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let probe = ffmpeg::probe_video(path).await?;
        Ok(ffmpeg::parse_duration(&probe))
    }

    async fn capture_frame(&self, path: &Path, offset_secs: f64) -> Result<Vec<u8>, MediaError> {
        // Removed when dropped.
        let scratch = tempfile::Builder::new()
            .prefix("roadscan-frame-")
            .suffix(".jpg")
            .tempfile()?;

        ffmpeg::extract_frame_jpeg(path, scratch.path(), offset_secs, self.thumbnail_width)
            .await?;

        let bytes = tokio::fs::read(scratch.path()).await?;
        validate_jpeg(&bytes)?;
        Ok(bytes)
    }
}

/// Check that `bytes` decodes to an image header with non-zero dimensions.
pub fn validate_jpeg(bytes: &[u8]) -> Result<(u32, u32), MediaError> {
    if bytes.is_empty() {
        return Err(MediaError::EmptyFrame);
    }
    let (width, height) = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(MediaError::EmptyFrame);
    }
    Ok((width, height))
}
