//! Processing Initiator.
//!
//! Starts AI processing for one video. Demo videos (file name matches the
//! [`DemoRegistry`]) are walked through a canned progress schedule locally
//! and completed with pre-computed detections. Every other video is handed
//! to the backend; after a confirmed start its progress comes from the
//! reconciliation poller.

use std::sync::Arc;
use std::time::Duration;

use roadscan_core::demo::DemoRegistry;
use roadscan_core::video_status::{Trigger, VideoStatus};
use roadscan_events::{Notification, NotificationBus};
use roadscan_remote::{AssetRecord, StatusUpdate, SurveyBackend};

use crate::demo_cache::DemoDataCache;
use crate::error::IngestError;
use crate::record::VideoRecord;
use crate::store::{RecordStore, StoreEvent, Transition};

/// How a processing request was carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingOutcome {
    /// Demo dataset applied; carries the number of detections loaded.
    Demo { detections: usize },
    /// The backend accepted the request.
    Started,
}

pub struct ProcessingInitiator {
    store: RecordStore,
    backend: Arc<dyn SurveyBackend>,
    bus: Arc<NotificationBus>,
    registry: Arc<DemoRegistry>,
    cache: Arc<DemoDataCache>,
    step_delay: Duration,
    steps: Vec<u8>,
}

impl ProcessingInitiator {
    pub fn new(
        store: RecordStore,
        backend: Arc<dyn SurveyBackend>,
        bus: Arc<NotificationBus>,
        registry: Arc<DemoRegistry>,
        cache: Arc<DemoDataCache>,
        step_delay: Duration,
        steps: Vec<u8>,
    ) -> Self {
        Self {
            store,
            backend,
            bus,
            registry,
            cache,
            step_delay,
            steps,
        }
    }

    pub async fn process_with_ai(&self, local_id: &str) -> Result<ProcessingOutcome, IngestError> {
        let snapshot = self.store.snapshot();
        let Some(record) = snapshot.get(local_id).cloned() else {
            self.bus.publish(
                Notification::error("Processing failed", "Video not found")
                    .for_video(Some(local_id), local_id),
            );
            return Err(IngestError::UnknownVideo(local_id.to_string()));
        };
        let Some(backend_id) = record.backend_id.clone() else {
            self.bus.publish(
                Notification::error(
                    "Processing failed",
                    format!("{} has not been registered with the backend yet", record.name),
                )
                .for_video(Some(local_id), &record.name),
            );
            return Err(IngestError::NotRegistered {
                local_id: local_id.to_string(),
                name: record.name,
            });
        };

        let demo_key = self.registry.match_name(&record.name).map(str::to_string);
        match demo_key {
            Some(key) => self.run_demo(&record, &backend_id, &key).await,
            None => self.run_real(&record, &backend_id).await,
        }
    }

    // -----------------------------------------------------------------------
    // Demo branch
    // -----------------------------------------------------------------------

    async fn run_demo(
        &self,
        record: &VideoRecord,
        backend_id: &str,
        key: &str,
    ) -> Result<ProcessingOutcome, IngestError> {
        tracing::info!(local_id = %record.local_id, backend_id, dataset = key, "Starting demo processing");

        match self.demo_steps(record, backend_id, key).await {
            Ok(detections) => {
                self.bus.publish(
                    Notification::success(
                        "Processing complete",
                        format!("{}: {detections} detections loaded", record.name),
                    )
                    .for_video(Some(&record.local_id), &record.name),
                );
                Ok(ProcessingOutcome::Demo { detections })
            }
            Err(e) => {
                let _ = self
                    .store
                    .dispatch(transition(record, Trigger::ProcessingFailed))
                    .await;
                self.bus.publish(
                    Notification::error(
                        "Processing failed",
                        format!("Demo processing of {} failed: {e}", record.name),
                    )
                    .for_video(Some(&record.local_id), &record.name),
                );
                Err(e)
            }
        }
    }

    async fn demo_steps(
        &self,
        record: &VideoRecord,
        backend_id: &str,
        key: &str,
    ) -> Result<usize, IngestError> {
        self.store
            .dispatch(transition(record, Trigger::DemoStarted))
            .await?;
        self.mirror_status(backend_id, StatusUpdate::new(VideoStatus::Processing, 0))
            .await;

        for &step in &self.steps {
            tokio::time::sleep(self.step_delay).await;
            self.store
                .dispatch(StoreEvent::Transition(
                    Transition::new(record.local_id.clone(), Trigger::ProcessingProgress)
                        .with_progress(step),
                ))
                .await?;
        }

        let detections = self
            .cache
            .get_or_load(backend_id, || self.backend.load_demo_detections(key))
            .await
            .map_err(|e| IngestError::remote(&record.name, e))?;

        let count = detections.as_ref().map_or(0, |d| d.len());
        if let Some(detections) = detections.filter(|d| !d.is_empty()) {
            let assets: Vec<AssetRecord> = detections
                .iter()
                .map(|d| {
                    AssetRecord::from_demo_detection(
                        d,
                        backend_id,
                        record.survey_id.as_deref(),
                        &record.route_id,
                    )
                })
                .collect();
            match self.backend.bulk_insert_assets(&assets).await {
                Ok(inserted) => tracing::info!(local_id = %record.local_id, inserted, "Demo assets stored"),
                Err(e) => {
                    tracing::warn!(local_id = %record.local_id, error = %e, "Failed to store demo assets")
                }
            }
        } else {
            tracing::info!(local_id = %record.local_id, dataset = key, "No demo detections available");
        }

        self.store
            .dispatch(transition(record, Trigger::ProcessingCompleted))
            .await?;
        self.mirror_status(backend_id, StatusUpdate::new(VideoStatus::Completed, 100))
            .await;

        Ok(count)
    }

    /// Best-effort copy of a local demo status to the backend.
    async fn mirror_status(&self, backend_id: &str, update: StatusUpdate) {
        if let Err(e) = self.backend.update_video_status(backend_id, &update).await {
            tracing::warn!(backend_id, status = %update.status, error = %e, "Failed to mirror demo status");
        }
    }

    // -----------------------------------------------------------------------
    // Real branch
    // -----------------------------------------------------------------------

    async fn run_real(
        &self,
        record: &VideoRecord,
        backend_id: &str,
    ) -> Result<ProcessingOutcome, IngestError> {
        if let Err(e) = self
            .store
            .dispatch(transition(record, Trigger::ProcessingRequested))
            .await
        {
            self.bus.publish(
                Notification::error(
                    "Processing failed",
                    format!("Cannot start processing {}: {e}", record.name),
                )
                .for_video(Some(&record.local_id), &record.name),
            );
            return Err(e);
        }

        let message = match self.backend.start_ai_processing(backend_id).await {
            Ok(response) if response.ok => {
                self.store
                    .dispatch(transition(record, Trigger::ProcessingConfirmed))
                    .await?;
                tracing::info!(local_id = %record.local_id, backend_id, "AI processing started");
                self.bus.publish(
                    Notification::info(
                        "Processing started",
                        format!("AI processing started for {}", record.name),
                    )
                    .for_video(Some(&record.local_id), &record.name),
                );
                return Ok(ProcessingOutcome::Started);
            }
            Ok(response) => response
                .message
                .unwrap_or_else(|| "The backend refused to start processing".to_string()),
            Err(e) => e.to_string(),
        };

        tracing::warn!(local_id = %record.local_id, backend_id, reason = %message, "AI processing rejected");
        let _ = self
            .store
            .dispatch(transition(record, Trigger::ProcessingRejected))
            .await;
        self.bus.publish(
            Notification::error(
                "Processing failed",
                format!("Could not start processing {}: {message}", record.name),
            )
            .for_video(Some(&record.local_id), &record.name),
        );
        Err(IngestError::ProcessingRejected {
            local_id: record.local_id.clone(),
            name: record.name.clone(),
            message,
        })
    }
}

fn transition(record: &VideoRecord, trigger: Trigger) -> StoreEvent {
    StoreEvent::Transition(Transition::new(record.local_id.clone(), trigger))
}
