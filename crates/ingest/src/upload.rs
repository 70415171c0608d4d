//! Upload Orchestrator.
//!
//! A batch call creates one remote survey, then one remote video row and
//! one local record per file, sequentially. Only once every row exists are
//! the per-file transfers launched, all at once, on the task tracker; the
//! call returns the created records without waiting for them.
//!
//! Each transfer task claims its record in the store, streams the file,
//! derives a thumbnail and attaches the batch GPX track, then releases the
//! record. A successful transfer leaves the record `uploading`; the
//! reconciliation poller advances it from there.
//!
//! A batch owns its source files. The GPX track is removed once read, and
//! each video once its task ends or its row could not be created.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio_util::task::TaskTracker;

use roadscan_core::video_status::{Trigger, VideoStatus};
use roadscan_events::{Notification, NotificationBus};
use roadscan_remote::{
    LibraryCopy, NewSurvey, NewVideo, ProgressFn, SurveyBackend, UploadOutcome, UploadProgress,
    SURVEY_STATUS_UPLOADING,
};

use crate::error::IngestError;
use crate::media::MediaTools;
use crate::record::{SurveyContext, VideoRecord};
use crate::store::{RecordStore, StoreEvent, Transition};
use crate::thumbnail::ThumbnailDeriver;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// A selected video file, already on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
}

/// A GPS track file on local disk.
#[derive(Debug, Clone, PartialEq)]
pub struct GpxFile {
    pub path: PathBuf,
    pub name: String,
}

/// A video that already lives in the server-side media library.
#[derive(Debug, Clone, PartialEq)]
pub struct LibraryImport {
    pub path: PathBuf,
    pub size: u64,
    pub thumb_path: Option<String>,
}

/// GPX payload read once per batch and shared by its upload tasks.
struct BatchGpx {
    name: String,
    bytes: Arc<[u8]>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Counts calls that are in their synchronous creation phase.
struct CreationGuard(Arc<AtomicUsize>);

impl CreationGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for CreationGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct UploadOrchestrator {
    store: RecordStore,
    backend: Arc<dyn SurveyBackend>,
    media: Arc<dyn MediaTools>,
    thumbnails: Arc<ThumbnailDeriver>,
    bus: Arc<NotificationBus>,
    tracker: TaskTracker,
    creating: Arc<AtomicUsize>,
    library_duration_secs: (f64, f64),
}

impl UploadOrchestrator {
    pub fn new(
        store: RecordStore,
        backend: Arc<dyn SurveyBackend>,
        media: Arc<dyn MediaTools>,
        thumbnails: Arc<ThumbnailDeriver>,
        bus: Arc<NotificationBus>,
        tracker: TaskTracker,
        library_duration_secs: (f64, f64),
    ) -> Self {
        Self {
            store,
            backend,
            media,
            thumbnails,
            bus,
            tracker,
            creating: Arc::new(AtomicUsize::new(0)),
            library_duration_secs,
        }
    }

    /// `true` while any upload call is still creating its survey and rows.
    pub fn is_uploading(&self) -> bool {
        self.creating.load(Ordering::SeqCst) > 0
    }

    /// Register every file with the backend and start their transfers.
    ///
    /// A file whose row cannot be created is reported and skipped. If no
    /// row at all could be created, the survey is deleted again and the
    /// call fails.
    pub async fn upload_files(
        &self,
        files: Vec<UploadFile>,
        survey: SurveyContext,
        gpx: Option<GpxFile>,
    ) -> Result<Vec<VideoRecord>, IngestError> {
        let _creating = CreationGuard::enter(&self.creating);

        let survey_id = match self.create_survey(&survey).await {
            Ok(survey_id) => survey_id,
            Err(e) => {
                let paths = files.iter().map(|f| &f.path).chain(gpx.iter().map(|g| &g.path));
                for path in paths {
                    discard_source(path).await;
                }
                return Err(e);
            }
        };
        let gpx = match gpx {
            Some(file) => {
                let read = self.read_gpx(&file).await;
                discard_source(&file.path).await;
                read
            }
            None => None,
        };

        let mut created = Vec::with_capacity(files.len());
        for file in files {
            let duration = match self.media.probe_duration(&file.path).await {
                Ok(duration) => duration,
                Err(e) => {
                    tracing::warn!(file = %file.name, error = %e, "Duration probe failed, using 0");
                    0.0
                }
            };

            let new_video = NewVideo {
                survey_id: survey_id.clone(),
                route_id: survey.route_id.clone(),
                title: file.name.clone(),
                size_bytes: file.size,
                duration_secs: duration,
                status: VideoStatus::Queue,
                progress: 0,
            };
            let backend_id = match self.backend.create_video(&new_video).await {
                Ok(id) => id,
                Err(e) => {
                    self.bus.publish(
                        Notification::error(
                            "Upload failed",
                            format!("Could not register {} with the backend: {e}", file.name),
                        )
                        .for_video(None, &file.name),
                    );
                    discard_source(&file.path).await;
                    continue;
                }
            };

            let record = VideoRecord::new(
                &file.name,
                file.size,
                duration,
                &survey,
                &survey_id,
                backend_id,
                VideoStatus::Queue,
            );
            self.store.dispatch(StoreEvent::Insert(record.clone())).await?;
            tracing::info!(
                local_id = %record.local_id,
                backend_id = record.backend_id.as_deref(),
                survey_id = %survey_id,
                file = %record.name,
                "Video registered",
            );
            created.push((record, file.path));
        }

        if created.is_empty() {
            if let Err(e) = self.backend.delete_survey(&survey_id).await {
                tracing::warn!(survey_id = %survey_id, error = %e, "Failed to delete empty survey");
            }
            return Err(IngestError::EmptyBatch { survey_id });
        }

        let mut records = Vec::with_capacity(created.len());
        for (record, path) in created {
            let this = self.clone();
            let task_record = record.clone();
            let gpx = gpx.clone();
            self.tracker
                .spawn(async move { this.run_upload(task_record, path, gpx).await });
            records.push(record);
        }

        Ok(records)
    }

    /// Import one video from the media library by server-side copy.
    ///
    /// No local probing or thumbnail capture happens here: the duration is
    /// a random placeholder and `thumb_path`, if any, becomes the
    /// thumbnail URL.
    pub async fn upload_from_library(
        &self,
        import: LibraryImport,
        survey: SurveyContext,
    ) -> Result<VideoRecord, IngestError> {
        let _creating = CreationGuard::enter(&self.creating);

        let survey_id = self.create_survey(&survey).await?;
        let name = import
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| import.path.display().to_string());
        let (min, max) = self.library_duration_secs;
        let duration = rand::rng().random_range(min..=max);

        let new_video = NewVideo {
            survey_id: survey_id.clone(),
            route_id: survey.route_id.clone(),
            title: name.clone(),
            size_bytes: import.size,
            duration_secs: duration,
            status: VideoStatus::Uploading,
            progress: 0,
        };
        let backend_id = match self.backend.create_video(&new_video).await {
            Ok(id) => id,
            Err(e) => {
                self.bus.publish(
                    Notification::error(
                        "Import failed",
                        format!("Could not register {name} with the backend: {e}"),
                    )
                    .for_video(None, &name),
                );
                if let Err(e) = self.backend.delete_survey(&survey_id).await {
                    tracing::warn!(survey_id = %survey_id, error = %e, "Failed to delete empty survey");
                }
                return Err(IngestError::remote(name, e));
            }
        };

        let mut record = VideoRecord::new(
            &name,
            import.size,
            duration,
            &survey,
            &survey_id,
            backend_id.clone(),
            VideoStatus::Uploading,
        );
        record.thumbnail_url = import.thumb_path.clone();
        self.store.dispatch(StoreEvent::Insert(record.clone())).await?;

        let copy = LibraryCopy {
            path: import.path,
            video_id: backend_id,
            survey_id,
            route_id: survey.route_id,
            thumb_path: import.thumb_path,
        };
        let this = self.clone();
        let task_record = record.clone();
        self.tracker
            .spawn(async move { this.run_library_copy(task_record, copy).await });

        Ok(record)
    }

    // -----------------------------------------------------------------------
    // Per-file tasks
    // -----------------------------------------------------------------------

    async fn run_upload(&self, record: VideoRecord, source: PathBuf, gpx: Option<Arc<BatchGpx>>) {
        self.transfer(&record, &source, gpx).await;
        discard_source(&source).await;
    }

    async fn transfer(&self, record: &VideoRecord, source: &Path, gpx: Option<Arc<BatchGpx>>) {
        let Some(backend_id) = record.backend_id.clone() else {
            return;
        };
        if !self.claim(record).await {
            return;
        }

        let store = self.store.clone();
        let local_id = record.local_id.clone();
        let on_progress: ProgressFn = Arc::new(move |progress: UploadProgress| {
            store.dispatch_nowait(StoreEvent::Transition(
                Transition::new(local_id.clone(), Trigger::UploadProgress)
                    .with_progress(progress.percent()),
            ));
        });

        match self
            .backend
            .upload_video(&backend_id, source, record.size, on_progress)
            .await
        {
            Ok(outcome) => {
                self.transfer_finished(record, outcome).await;

                match self
                    .thumbnails
                    .derive(source, record.duration, &backend_id)
                    .await
                {
                    Ok(url) => {
                        self.apply(StoreEvent::SetThumbnail {
                            local_id: record.local_id.clone(),
                            url,
                        })
                        .await;
                    }
                    Err(e) => {
                        tracing::warn!(local_id = %record.local_id, error = %e, "Thumbnail generation failed");
                    }
                }

                if let Some(gpx) = gpx {
                    match self
                        .backend
                        .upload_gpx(&backend_id, &gpx.name, gpx.bytes.to_vec())
                        .await
                    {
                        Ok(()) => {
                            self.apply(StoreEvent::SetGpxFile {
                                local_id: record.local_id.clone(),
                                file_name: gpx.name.clone(),
                            })
                            .await;
                        }
                        Err(e) => {
                            tracing::warn!(local_id = %record.local_id, error = %e, "GPX upload failed");
                        }
                    }
                }
            }
            Err(e) => self.transfer_failed(record, &e.to_string()).await,
        }

        self.release(record).await;
    }

    async fn run_library_copy(&self, record: VideoRecord, copy: LibraryCopy) {
        if !self.claim(&record).await {
            return;
        }

        match self.backend.copy_from_library(&copy).await {
            Ok(outcome) => self.transfer_finished(&record, outcome).await,
            Err(e) => self.transfer_failed(&record, &e.to_string()).await,
        }

        self.release(&record).await;
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    async fn create_survey(&self, survey: &SurveyContext) -> Result<String, IngestError> {
        let new_survey = NewSurvey {
            route_id: survey.route_id.clone(),
            survey_date: survey.survey_date,
            surveyor_name: survey.surveyor_name.clone(),
            status: SURVEY_STATUS_UPLOADING.to_string(),
        };
        match self.backend.create_survey(&new_survey).await {
            Ok(survey_id) => {
                tracing::info!(survey_id = %survey_id, route_id = %survey.route_id, "Survey created");
                Ok(survey_id)
            }
            Err(e) => {
                self.bus.publish(Notification::error(
                    "Upload failed",
                    format!("Could not create a survey for route {}: {e}", survey.route_id),
                ));
                Err(IngestError::remote(
                    format!("survey for route {}", survey.route_id),
                    e,
                ))
            }
        }
    }

    async fn read_gpx(&self, file: &GpxFile) -> Option<Arc<BatchGpx>> {
        match tokio::fs::read(&file.path).await {
            Ok(bytes) => Some(Arc::new(BatchGpx {
                name: file.name.clone(),
                bytes: bytes.into(),
            })),
            Err(e) => {
                tracing::warn!(file = %file.name, error = %e, "Failed to read GPX file, continuing without it");
                None
            }
        }
    }

    async fn claim(&self, record: &VideoRecord) -> bool {
        match self
            .store
            .dispatch(StoreEvent::Claim(record.local_id.clone()))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(local_id = %record.local_id, error = %e, "Could not claim video for upload");
                false
            }
        }
    }

    async fn release(&self, record: &VideoRecord) {
        self.apply(StoreEvent::Release(record.local_id.clone())).await;
    }

    async fn transfer_finished(&self, record: &VideoRecord, outcome: UploadOutcome) {
        self.apply(StoreEvent::Transition(Transition::new(
            record.local_id.clone(),
            Trigger::UploadFinished,
        )))
        .await;
        tracing::info!(
            local_id = %record.local_id,
            backend_id = record.backend_id.as_deref(),
            "Video transfer finished",
        );

        if outcome.gpx_created {
            tracing::info!(local_id = %record.local_id, "Backend extracted a GPS track from the video");
            self.bus.publish(
                Notification::info(
                    "GPS track extracted",
                    format!("A GPS track was extracted from {}", record.name),
                )
                .for_video(Some(&record.local_id), &record.name),
            );
        }
    }

    async fn transfer_failed(&self, record: &VideoRecord, reason: &str) {
        self.apply(StoreEvent::Transition(Transition::new(
            record.local_id.clone(),
            Trigger::UploadFailed,
        )))
        .await;
        self.bus.publish(
            Notification::error(
                "Upload failed",
                format!("Failed to upload {}: {reason}", record.name),
            )
            .for_video(Some(&record.local_id), &record.name),
        );
    }

    /// Dispatch an event whose refusal has already been logged by the store.
    async fn apply(&self, event: StoreEvent) {
        let _ = self.store.dispatch(event).await;
    }
}

/// Remove a consumed source file. One that is already gone is fine.
async fn discard_source(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "Upload source removed"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove upload source");
        }
    }
}
