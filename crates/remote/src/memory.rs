//! Self-contained in-memory survey backend.
//!
//! Used when no `BACKEND_URL` is configured (local demo mode) and by the
//! test suites. Surveys, videos and assets live in memory, every call is
//! appended to a log, and a handful of knobs let callers inject failures,
//! hold uploads mid-flight and script what `get_video` reports.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex};

use roadscan_core::types::{BackendId, SurveyId};
use roadscan_core::video_status::VideoStatus;

use crate::backend::{RemoteError, SurveyBackend};
use crate::types::{
    AssetRecord, Detection, LibraryCopy, NewSurvey, NewVideo, ProgressFn, RemoteVideo,
    StartProcessing, StatusUpdate, UploadOutcome, UploadProgress,
};

/// Number of progress callbacks emitted per simulated upload.
const UPLOAD_STEPS: u64 = 4;

/// One recorded call against the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateSurvey(String),
    DeleteSurvey(SurveyId),
    CreateVideo(String),
    UpdateVideoStatus(BackendId, StatusUpdate),
    GetVideo(BackendId),
    UploadVideo(BackendId),
    UploadThumbnail(BackendId),
    UploadGpx(BackendId, String),
    CopyFromLibrary(BackendId),
    StartAiProcessing(BackendId),
    BulkInsertAssets(usize),
    LoadDemoDetections(String),
}

/// A video row as held by the in-memory backend.
#[derive(Debug, Clone)]
pub struct StoredVideo {
    pub video: NewVideo,
    pub remote: RemoteVideo,
    pub thumbnail_url: Option<String>,
    pub gpx_file: Option<String>,
    pub library_path: Option<PathBuf>,
    /// Length of the source file seen by the last `upload_video`.
    pub uploaded_bytes: Option<u64>,
}

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    surveys: HashMap<SurveyId, NewSurvey>,
    videos: HashMap<BackendId, StoredVideo>,
    assets: Vec<AssetRecord>,
    calls: Vec<BackendCall>,
    demo_detections: HashMap<String, Vec<Detection>>,

    // Knobs.
    failing_creates: HashSet<String>,
    failing_uploads: HashSet<String>,
    failing_fetches: HashSet<BackendId>,
    fetch_delay: Option<Duration>,
    fail_thumbnails: bool,
    fail_gpx: bool,
    fail_demo_loads: bool,
    processing_rejection: Option<String>,
    gpx_created: bool,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn video_mut(&mut self, video_id: &str) -> Result<&mut StoredVideo, RemoteError> {
        self.videos.get_mut(video_id).ok_or_else(|| RemoteError::NotFound {
            entity: "Video",
            id: video_id.to_string(),
        })
    }
}

fn injected(what: &str) -> RemoteError {
    RemoteError::Api {
        status: 503,
        body: format!("injected failure: {what}"),
    }
}

/// In-memory [`SurveyBackend`].
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
    /// `true` while uploads are held at the gate.
    hold: watch::Sender<bool>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            state: Mutex::new(MemoryState::default()),
            hold,
        }
    }

    // -----------------------------------------------------------------------
    // Knobs
    // -----------------------------------------------------------------------

    /// Fail `create_video` for videos with this title.
    pub async fn fail_video_creation_for(&self, title: &str) {
        self.state.lock().await.failing_creates.insert(title.to_string());
    }

    /// Fail the byte upload (and library copy) of videos with this title.
    pub async fn fail_uploads_for(&self, title: &str) {
        self.state.lock().await.failing_uploads.insert(title.to_string());
    }

    /// Fail `get_video` for this backend id.
    pub async fn fail_status_fetches_for(&self, video_id: &str) {
        self.state.lock().await.failing_fetches.insert(video_id.to_string());
    }

    /// Make every `get_video` call sleep before answering.
    pub async fn delay_status_fetches(&self, delay: Duration) {
        self.state.lock().await.fetch_delay = Some(delay);
    }

    pub async fn fail_thumbnails(&self) {
        self.state.lock().await.fail_thumbnails = true;
    }

    pub async fn fail_gpx_uploads(&self) {
        self.state.lock().await.fail_gpx = true;
    }

    pub async fn fail_demo_loads(&self) {
        self.state.lock().await.fail_demo_loads = true;
    }

    /// Answer `start_ai_processing` with `ok: false` and this message.
    pub async fn reject_processing(&self, message: &str) {
        self.state.lock().await.processing_rejection = Some(message.to_string());
    }

    /// Report `gpxCreated` on every successful upload or library copy.
    pub async fn report_gpx_created(&self, created: bool) {
        self.state.lock().await.gpx_created = created;
    }

    pub async fn seed_demo_detections(&self, key: &str, detections: Vec<Detection>) {
        self.state
            .lock()
            .await
            .demo_detections
            .insert(key.to_string(), detections);
    }

    /// Overwrite what `get_video` reports for a video.
    pub async fn set_remote_status(&self, video_id: &str, remote: RemoteVideo) -> bool {
        match self.state.lock().await.videos.get_mut(video_id) {
            Some(stored) => {
                stored.remote = remote;
                true
            }
            None => false,
        }
    }

    /// Park every subsequent upload until [`release_uploads`](Self::release_uploads).
    pub fn hold_uploads(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_uploads(&self) {
        self.hold.send_replace(false);
    }

    // -----------------------------------------------------------------------
    // Inspection
    // -----------------------------------------------------------------------

    pub async fn calls(&self) -> Vec<BackendCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn video(&self, video_id: &str) -> Option<StoredVideo> {
        self.state.lock().await.videos.get(video_id).cloned()
    }

    pub async fn video_count(&self) -> usize {
        self.state.lock().await.videos.len()
    }

    pub async fn surveys(&self) -> HashMap<SurveyId, NewSurvey> {
        self.state.lock().await.surveys.clone()
    }

    pub async fn assets(&self) -> Vec<AssetRecord> {
        self.state.lock().await.assets.clone()
    }

    async fn record(&self, call: BackendCall) -> tokio::sync::MutexGuard<'_, MemoryState> {
        let mut state = self.state.lock().await;
        state.calls.push(call);
        state
    }

    async fn wait_for_gate(&self) {
        let mut rx = self.hold.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _ = rx.wait_for(|held| !*held).await;
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SurveyBackend for InMemoryBackend {
    async fn create_survey(&self, survey: &NewSurvey) -> Result<SurveyId, RemoteError> {
        let mut state = self.record(BackendCall::CreateSurvey(survey.route_id.clone())).await;
        let id = state.next_id("survey");
        state.surveys.insert(id.clone(), survey.clone());
        Ok(id)
    }

    async fn delete_survey(&self, survey_id: &str) -> Result<(), RemoteError> {
        let mut state = self.record(BackendCall::DeleteSurvey(survey_id.to_string())).await;
        state
            .surveys
            .remove(survey_id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound {
                entity: "Survey",
                id: survey_id.to_string(),
            })
    }

    async fn create_video(&self, video: &NewVideo) -> Result<BackendId, RemoteError> {
        let mut state = self.record(BackendCall::CreateVideo(video.title.clone())).await;
        if state.failing_creates.contains(&video.title) {
            return Err(injected("create_video"));
        }
        let id = state.next_id("video");
        state.videos.insert(
            id.clone(),
            StoredVideo {
                video: video.clone(),
                remote: RemoteVideo {
                    status: video.status.as_str().to_string(),
                    progress: Some(f64::from(video.progress)),
                    eta: None,
                    error: None,
                },
                thumbnail_url: None,
                gpx_file: None,
                library_path: None,
                uploaded_bytes: None,
            },
        );
        Ok(id)
    }

    async fn update_video_status(
        &self,
        video_id: &str,
        update: &StatusUpdate,
    ) -> Result<(), RemoteError> {
        let mut state = self
            .record(BackendCall::UpdateVideoStatus(video_id.to_string(), *update))
            .await;
        let stored = state.video_mut(video_id)?;
        stored.remote.status = update.status.as_str().to_string();
        stored.remote.progress = Some(f64::from(update.progress));
        Ok(())
    }

    async fn get_video(&self, video_id: &str) -> Result<RemoteVideo, RemoteError> {
        let delay = self
            .record(BackendCall::GetVideo(video_id.to_string()))
            .await
            .fetch_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        if state.failing_fetches.contains(video_id) {
            return Err(injected("get_video"));
        }
        Ok(state.video_mut(video_id)?.remote.clone())
    }

    async fn upload_video(
        &self,
        video_id: &str,
        source: &Path,
        size: u64,
        on_progress: ProgressFn,
    ) -> Result<UploadOutcome, RemoteError> {
        let title = {
            let mut state = self.record(BackendCall::UploadVideo(video_id.to_string())).await;
            state.video_mut(video_id)?.video.title.clone()
        };
        let source_len = tokio::fs::metadata(source).await?.len();

        self.wait_for_gate().await;

        if self.state.lock().await.failing_uploads.contains(&title) {
            return Err(injected("upload_video"));
        }

        for step in 1..=UPLOAD_STEPS {
            on_progress(UploadProgress {
                sent: size * step / UPLOAD_STEPS,
                total: size,
            });
            tokio::task::yield_now().await;
        }

        let mut state = self.state.lock().await;
        let gpx_created = state.gpx_created;
        let stored = state.video_mut(video_id)?;
        stored.uploaded_bytes = Some(source_len);
        stored.remote.status = VideoStatus::Uploaded.as_str().to_string();
        stored.remote.progress = Some(100.0);
        Ok(UploadOutcome { gpx_created })
    }

    async fn upload_thumbnail(
        &self,
        video_id: &str,
        jpeg: Vec<u8>,
    ) -> Result<String, RemoteError> {
        let mut state = self.record(BackendCall::UploadThumbnail(video_id.to_string())).await;
        if state.fail_thumbnails {
            return Err(injected("upload_thumbnail"));
        }
        let url = format!("memory://thumbnails/{video_id}.jpg?bytes={}", jpeg.len());
        state.video_mut(video_id)?.thumbnail_url = Some(url.clone());
        Ok(url)
    }

    async fn upload_gpx(
        &self,
        video_id: &str,
        file_name: &str,
        _contents: Vec<u8>,
    ) -> Result<(), RemoteError> {
        let mut state = self
            .record(BackendCall::UploadGpx(
                video_id.to_string(),
                file_name.to_string(),
            ))
            .await;
        if state.fail_gpx {
            return Err(injected("upload_gpx"));
        }
        state.video_mut(video_id)?.gpx_file = Some(file_name.to_string());
        Ok(())
    }

    async fn copy_from_library(
        &self,
        request: &LibraryCopy,
    ) -> Result<UploadOutcome, RemoteError> {
        let title = {
            let mut state = self
                .record(BackendCall::CopyFromLibrary(request.video_id.clone()))
                .await;
            state.video_mut(&request.video_id)?.video.title.clone()
        };

        self.wait_for_gate().await;

        let mut state = self.state.lock().await;
        if state.failing_uploads.contains(&title) {
            return Err(injected("copy_from_library"));
        }
        let gpx_created = state.gpx_created;
        let stored = state.video_mut(&request.video_id)?;
        stored.library_path = Some(request.path.clone());
        if request.thumb_path.is_some() {
            stored.thumbnail_url = request.thumb_path.clone();
        }
        stored.remote.status = VideoStatus::Uploaded.as_str().to_string();
        stored.remote.progress = Some(100.0);
        Ok(UploadOutcome { gpx_created })
    }

    async fn start_ai_processing(&self, video_id: &str) -> Result<StartProcessing, RemoteError> {
        let mut state = self
            .record(BackendCall::StartAiProcessing(video_id.to_string()))
            .await;
        if let Some(message) = state.processing_rejection.clone() {
            return Ok(StartProcessing::rejected(message));
        }
        let stored = state.video_mut(video_id)?;
        stored.remote.status = VideoStatus::Processing.as_str().to_string();
        stored.remote.progress = Some(0.0);
        Ok(StartProcessing::accepted())
    }

    async fn bulk_insert_assets(&self, assets: &[AssetRecord]) -> Result<usize, RemoteError> {
        let mut state = self.record(BackendCall::BulkInsertAssets(assets.len())).await;
        state.assets.extend_from_slice(assets);
        Ok(assets.len())
    }

    async fn load_demo_detections(
        &self,
        key: &str,
    ) -> Result<Option<Vec<Detection>>, RemoteError> {
        let state = self
            .record(BackendCall::LoadDemoDetections(key.to_string()))
            .await;
        if state.fail_demo_loads {
            return Err(injected("load_demo_detections"));
        }
        Ok(state.demo_detections.get(key).cloned())
    }
}
