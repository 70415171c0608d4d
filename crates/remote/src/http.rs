//! REST client for the survey backend.
//!
//! Wraps the backend's JSON endpoints using [`reqwest`]. The video binary
//! is streamed from disk in chunks so large survey clips never sit in
//! memory, and each chunk that leaves the process is reported through the
//! caller's progress callback.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use tokio_util::io::ReaderStream;

use roadscan_core::types::{BackendId, SurveyId};

use crate::backend::{RemoteError, SurveyBackend};
use crate::types::{
    AssetRecord, Detection, LibraryCopy, NewSurvey, NewVideo, ProgressFn, RemoteVideo,
    StartProcessing, StatusUpdate, UploadOutcome, UploadProgress,
};

/// Read size for streaming video uploads.
const UPLOAD_CHUNK_SIZE: usize = 256 * 1024;

/// HTTP client for one survey backend.
pub struct HttpBackend {
    client: reqwest::Client,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct CreatedResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThumbnailResponse {
    thumbnail_url: String,
}

#[derive(Debug, Deserialize)]
struct BulkInsertResponse {
    inserted: usize,
}

impl HttpBackend {
    /// Create a client against `api_url`, e.g. `http://host:8080/api`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        Self { client, api_url }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_url)
    }

    // -----------------------------------------------------------------------
    // Private helpers
    // -----------------------------------------------------------------------

    /// Check that the response has a success status code, returning an
    /// [`RemoteError::Api`] with the body text if it does not.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, RemoteError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            tracing::debug!(status = status.as_u16(), %body, "Survey backend returned an error");
            return Err(RemoteError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RemoteError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), RemoteError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl SurveyBackend for HttpBackend {
    async fn create_survey(&self, survey: &NewSurvey) -> Result<SurveyId, RemoteError> {
        let response = self
            .client
            .post(self.url("/surveys"))
            .json(survey)
            .send()
            .await?;
        let created: CreatedResponse = Self::parse_response(response).await?;
        Ok(created.id)
    }

    async fn delete_survey(&self, survey_id: &str) -> Result<(), RemoteError> {
        let response = self
            .client
            .delete(self.url(&format!("/surveys/{survey_id}")))
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn create_video(&self, video: &NewVideo) -> Result<BackendId, RemoteError> {
        let response = self
            .client
            .post(self.url("/videos"))
            .json(video)
            .send()
            .await?;
        let created: CreatedResponse = Self::parse_response(response).await?;
        Ok(created.id)
    }

    async fn update_video_status(
        &self,
        video_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), RemoteError> {
        let response = self
            .client
            .patch(self.url(&format!("/videos/{video_id}/status")))
            .json(update)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn get_video(&self, video_id: &str) -> Result<RemoteVideo, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("/videos/{video_id}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound {
                entity: "Video",
                id: video_id.to_string(),
            });
        }
        Self::parse_response(response).await
    }

    async fn upload_video(
        &self,
        video_id: &str,
        source: &Path,
        size: u64,
        on_progress: ProgressFn,
    ) -> Result<UploadOutcome, RemoteError> {
        let file = tokio::fs::File::open(source).await?;
        tracing::debug!(video_id, path = %source.display(), size, "Streaming video binary");
        let sent = Arc::new(AtomicU64::new(0));

        let stream = ReaderStream::with_capacity(file, UPLOAD_CHUNK_SIZE).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                let len = bytes.len() as u64;
                let total_sent = sent.fetch_add(len, Ordering::Relaxed) + len;
                on_progress(UploadProgress {
                    sent: total_sent,
                    total: size,
                });
            }
            chunk
        });

        let response = self
            .client
            .put(self.url(&format!("/videos/{video_id}/binary")))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, size)
            .body(reqwest::Body::wrap_stream(stream))
            .send()
            .await?;
        let outcome: UploadOutcome = Self::parse_response(response).await?;
        tracing::debug!(video_id, gpx_created = outcome.gpx_created, "Video binary stored");
        Ok(outcome)
    }

    async fn upload_thumbnail(
        &self,
        video_id: &str,
        jpeg: Vec<u8>,
    ) -> Result<String, RemoteError> {
        let part = Part::bytes(jpeg)
            .file_name("thumbnail.jpg")
            .mime_str("image/jpeg")?;
        let form = Form::new().part("thumbnail", part);

        let response = self
            .client
            .post(self.url(&format!("/videos/{video_id}/thumbnail")))
            .multipart(form)
            .send()
            .await?;
        let stored: ThumbnailResponse = Self::parse_response(response).await?;
        Ok(stored.thumbnail_url)
    }

    async fn upload_gpx(
        &self,
        video_id: &str,
        file_name: &str,
        contents: Vec<u8>,
    ) -> Result<(), RemoteError> {
        let part = Part::bytes(contents)
            .file_name(file_name.to_string())
            .mime_str("application/gpx+xml")?;
        let form = Form::new().part("gpx", part);

        let response = self
            .client
            .post(self.url(&format!("/videos/{video_id}/gpx")))
            .multipart(form)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn copy_from_library(
        &self,
        request: &LibraryCopy,
    ) -> Result<UploadOutcome, RemoteError> {
        let response = self
            .client
            .post(self.url(&format!("/videos/{}/library-copy", request.video_id)))
            .json(request)
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn start_ai_processing(&self, video_id: &str) -> Result<StartProcessing, RemoteError> {
        let response = self
            .client
            .post(self.url(&format!("/videos/{video_id}/process")))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    async fn bulk_insert_assets(&self, assets: &[AssetRecord]) -> Result<usize, RemoteError> {
        let response = self
            .client
            .post(self.url("/assets/bulk"))
            .json(assets)
            .send()
            .await?;
        let result: BulkInsertResponse = Self::parse_response(response).await?;
        Ok(result.inserted)
    }

    async fn load_demo_detections(
        &self,
        key: &str,
    ) -> Result<Option<Vec<Detection>>, RemoteError> {
        let response = self
            .client
            .get(self.url(&format!("/demo-data/{key}")))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::parse_response(response).await?))
    }
}
