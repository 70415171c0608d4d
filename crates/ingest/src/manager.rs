//! [`IngestManager`]: the facade the hosting process talks to.
//!
//! Created once at startup via [`IngestManager::new`]. It owns the record
//! store, the notification bus, the demo cache and the task tracker that
//! upload tasks run on, and wires the orchestrator, poller and processing
//! initiator to them. The returned `Arc` can be cloned into request
//! handlers.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use roadscan_core::demo::DemoRegistry;
use roadscan_core::types::LocalId;
use roadscan_core::video_status::Trigger;
use roadscan_events::{Notification, NotificationBus};
use roadscan_remote::{Detection, SurveyBackend};

use crate::config::IngestConfig;
use crate::demo_cache::DemoDataCache;
use crate::error::IngestError;
use crate::media::MediaTools;
use crate::poller::StatusPoller;
use crate::processing::{ProcessingInitiator, ProcessingOutcome};
use crate::record::{SurveyContext, VideoRecord};
use crate::store::{RecordStore, StoreEvent, StoreRejection, StoreSnapshot, Transition};
use crate::thumbnail::ThumbnailDeriver;
use crate::upload::{GpxFile, LibraryImport, UploadFile, UploadOrchestrator};

pub struct IngestManager {
    store: RecordStore,
    backend: Arc<dyn SurveyBackend>,
    bus: Arc<NotificationBus>,
    cache: Arc<DemoDataCache>,
    uploads: UploadOrchestrator,
    poller: Arc<StatusPoller>,
    processing: ProcessingInitiator,
    tracker: TaskTracker,
    cancel: CancellationToken,
    poller_handle: Mutex<Option<JoinHandle<()>>>,
}

impl IngestManager {
    /// Build the services and spawn the record store. Must be called from
    /// within a Tokio runtime. The poller is not started.
    pub fn new(
        backend: Arc<dyn SurveyBackend>,
        media: Arc<dyn MediaTools>,
        registry: DemoRegistry,
        bus: Arc<NotificationBus>,
        config: &IngestConfig,
    ) -> Arc<Self> {
        let store = RecordStore::spawn();
        let tracker = TaskTracker::new();
        let cache = Arc::new(DemoDataCache::new());

        let thumbnails = Arc::new(ThumbnailDeriver::new(
            media.clone(),
            backend.clone(),
            config.thumbnail_offset_secs,
        ));
        let uploads = UploadOrchestrator::new(
            store.clone(),
            backend.clone(),
            media,
            thumbnails,
            bus.clone(),
            tracker.clone(),
            (
                config.library_duration_min_secs,
                config.library_duration_max_secs,
            ),
        );
        let poller = Arc::new(StatusPoller::new(
            store.clone(),
            backend.clone(),
            bus.clone(),
            config.poll_interval,
            config.poll_fetch_timeout,
        ));
        let processing = ProcessingInitiator::new(
            store.clone(),
            backend.clone(),
            bus.clone(),
            Arc::new(registry),
            cache.clone(),
            config.demo_step_delay,
            config.demo_progress_steps.clone(),
        );

        Arc::new(Self {
            store,
            backend,
            bus,
            cache,
            uploads,
            poller,
            processing,
            tracker,
            cancel: CancellationToken::new(),
            poller_handle: Mutex::new(None),
        })
    }

    // -----------------------------------------------------------------------
    // Observation
    // -----------------------------------------------------------------------

    /// Receiver of every published store snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.store.subscribe()
    }

    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.store.snapshot()
    }

    pub fn is_uploading(&self) -> bool {
        self.uploads.is_uploading()
    }

    /// Subscribe to user-facing notifications.
    pub fn notifications(&self) -> broadcast::Receiver<Notification> {
        self.bus.subscribe()
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    pub fn demo_cache(&self) -> &Arc<DemoDataCache> {
        &self.cache
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    pub async fn upload_files(
        &self,
        files: Vec<UploadFile>,
        survey: SurveyContext,
        gpx: Option<GpxFile>,
    ) -> Result<Vec<VideoRecord>, IngestError> {
        self.uploads.upload_files(files, survey, gpx).await
    }

    pub async fn upload_from_library(
        &self,
        import: LibraryImport,
        survey: SurveyContext,
    ) -> Result<VideoRecord, IngestError> {
        self.uploads.upload_from_library(import, survey).await
    }

    /// Retrying needs the original file bytes, which are not kept after
    /// selection, so this always fails.
    pub async fn retry_upload(&self, local_id: &str) -> Result<(), IngestError> {
        let name = self
            .store
            .snapshot()
            .get(local_id)
            .map(|r| r.name.clone())
            .unwrap_or_else(|| local_id.to_string());
        let err = IngestError::RetryUnsupported {
            local_id: local_id.to_string(),
            name: name.clone(),
        };
        self.bus.publish(
            Notification::error("Retry not available", err.to_string())
                .for_video(Some(local_id), name),
        );
        Err(err)
    }

    /// Delete a local record. The remote row is left alone.
    pub async fn remove_video(&self, local_id: &str) -> Result<VideoRecord, IngestError> {
        let applied = match self
            .store
            .dispatch(StoreEvent::Remove(local_id.to_string()))
            .await
        {
            Ok(applied) => applied,
            Err(e) => return Err(self.notify_refusal("Remove failed", local_id, e)),
        };
        tracing::info!(local_id, "Video removed");
        applied
            .before
            .ok_or_else(|| IngestError::UnknownVideo(local_id.to_string()))
    }

    /// Attach a GPS track to an already registered video.
    pub async fn upload_gpx_for_video(
        &self,
        local_id: &str,
        gpx: GpxFile,
    ) -> Result<VideoRecord, IngestError> {
        let record = match self.lookup(local_id) {
            Ok(record) => record,
            Err(e) => {
                self.bus.publish(
                    Notification::error("GPX upload failed", "Video not found")
                        .for_video(Some(local_id), local_id),
                );
                return Err(e);
            }
        };
        let Some(backend_id) = record.backend_id.clone() else {
            self.notify_gpx_failure(&record, "the video is not registered with the backend yet");
            return Err(IngestError::NotRegistered {
                local_id: record.local_id,
                name: record.name,
            });
        };

        let bytes = match tokio::fs::read(&gpx.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.notify_gpx_failure(&record, &e.to_string());
                return Err(e.into());
            }
        };

        if let Err(e) = self.backend.upload_gpx(&backend_id, &gpx.name, bytes).await {
            self.notify_gpx_failure(&record, &e.to_string());
            return Err(IngestError::remote(&record.name, e));
        }

        let applied = self
            .store
            .dispatch(StoreEvent::SetGpxFile {
                local_id: record.local_id.clone(),
                file_name: gpx.name.clone(),
            })
            .await?;
        self.bus.publish(
            Notification::success(
                "GPS track attached",
                format!("{} was attached to {}", gpx.name, record.name),
            )
            .for_video(Some(&record.local_id), &record.name),
        );
        applied
            .after
            .ok_or_else(|| IngestError::UnknownVideo(local_id.to_string()))
    }

    pub async fn process_with_ai(&self, local_id: &str) -> Result<ProcessingOutcome, IngestError> {
        self.processing.process_with_ai(local_id).await
    }

    /// Force a record back to `uploaded` with progress 0. Local only.
    pub async fn reset_video_status(&self, local_id: &str) -> Result<VideoRecord, IngestError> {
        let applied = match self
            .store
            .dispatch(StoreEvent::Transition(Transition::new(
                local_id,
                Trigger::Reset,
            )))
            .await
        {
            Ok(applied) => applied,
            Err(e) => return Err(self.notify_refusal("Reset failed", local_id, e)),
        };
        tracing::info!(local_id, "Video status reset");
        applied
            .after
            .ok_or_else(|| IngestError::UnknownVideo(local_id.to_string()))
    }

    /// Cached demo detections for a video, if its demo processing ran.
    pub async fn demo_detections(
        &self,
        local_id: &str,
    ) -> Result<Option<Arc<Vec<Detection>>>, IngestError> {
        let record = self.lookup(local_id)?;
        match record.backend_id.as_deref() {
            Some(backend_id) => Ok(self.cache.get(backend_id).await),
            None => Ok(None),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Spawn the reconciliation poller. Calling this twice is a no-op.
    pub async fn start_poller(&self) {
        let mut handle = self.poller_handle.lock().await;
        if handle.is_some() {
            return;
        }
        let poller = self.poller.clone();
        let cancel = self.cancel.child_token();
        *handle = Some(tokio::spawn(async move { poller.run(cancel).await }));
    }

    /// Run one reconciliation pass now.
    pub async fn poll_once(&self) -> crate::poller::TickReport {
        self.poller.tick().await
    }

    /// Wait for every upload task spawned so far to finish.
    pub async fn wait_idle(&self) {
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Stop the poller and wait up to `timeout` for in-flight uploads.
    pub async fn shutdown(&self, timeout: Duration) {
        tracing::info!("Shutting down ingest manager");
        self.cancel.cancel();

        if let Some(handle) = self.poller_handle.lock().await.take() {
            let _ = tokio::time::timeout(timeout, handle).await;
        }

        self.tracker.close();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            tracing::warn!(
                pending = self.tracker.len(),
                "Upload tasks still running at shutdown"
            );
        }

        tracing::info!("Ingest manager shut down complete");
    }

    // ---- private helpers ----

    fn lookup(&self, local_id: &str) -> Result<VideoRecord, IngestError> {
        self.store
            .snapshot()
            .get(local_id)
            .cloned()
            .ok_or_else(|| IngestError::UnknownVideo(local_id.to_string()))
    }

    /// Report a refused store event on the bus and hand the error back.
    fn notify_refusal(&self, title: &str, local_id: &str, err: IngestError) -> IngestError {
        let err = unknown_video(err, local_id);
        let message = match &err {
            IngestError::UnknownVideo(_) => "Video not found".to_string(),
            other => other.to_string(),
        };
        self.bus.publish(Notification::error(title, message).for_video(Some(local_id), local_id));
        err
    }

    fn notify_gpx_failure(&self, record: &VideoRecord, reason: &str) {
        self.bus.publish(
            Notification::error(
                "GPX upload failed",
                format!("Could not attach a GPS track to {}: {reason}", record.name),
            )
            .for_video(Some(&record.local_id), &record.name),
        );
    }
}

fn unknown_video(err: IngestError, local_id: &str) -> IngestError {
    match err {
        IngestError::Rejected(StoreRejection::UnknownVideo(_)) => {
            IngestError::UnknownVideo(LocalId::from(local_id))
        }
        other => other,
    }
}
