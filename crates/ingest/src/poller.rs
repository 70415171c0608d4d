//! Status Reconciliation Poller.
//!
//! Every tick, each record that is `uploading` or `processing`, has a
//! backend id, and is not owned by an upload task gets its remote status
//! fetched and merged into the store. Fetches run one at a time and each
//! one is bounded by a timeout. A failed fetch or an unknown status string
//! is logged and the tick moves on to the next record; there is no backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use roadscan_core::video_status::{Trigger, VideoStatus};
use roadscan_events::{Notification, NotificationBus};
use roadscan_remote::SurveyBackend;

use crate::error::IngestError;
use crate::record::VideoRecord;
use crate::store::{RecordStore, StoreEvent, Transition};

/// Per-tick summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Records selected for a fetch.
    pub polled: usize,
    /// Merges that moved a record to a different status.
    pub transitions: usize,
    /// Fetches that failed, timed out or returned an unknown status.
    pub failures: usize,
}

pub struct StatusPoller {
    store: RecordStore,
    backend: Arc<dyn SurveyBackend>,
    bus: Arc<NotificationBus>,
    interval: Duration,
    fetch_timeout: Duration,
}

impl StatusPoller {
    pub fn new(
        store: RecordStore,
        backend: Arc<dyn SurveyBackend>,
        bus: Arc<NotificationBus>,
        interval: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            bus,
            interval,
            fetch_timeout,
        }
    }

    /// Run ticks at a fixed cadence until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(interval_ms = self.interval.as_millis() as u64, "Status poller started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Status poller stopping");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.tick().await;
                    if report.polled > 0 {
                        tracing::debug!(
                            polled = report.polled,
                            transitions = report.transitions,
                            failures = report.failures,
                            "Status poll tick",
                        );
                    }
                }
            }
        }
    }

    /// One reconciliation pass over the current snapshot.
    pub async fn tick(&self) -> TickReport {
        let snapshot = self.store.snapshot();
        let candidates: Vec<VideoRecord> = snapshot
            .records
            .iter()
            .filter(|r| {
                r.status.is_in_flight()
                    && r.backend_id.is_some()
                    && !snapshot.is_owned(&r.local_id)
            })
            .cloned()
            .collect();

        let mut report = TickReport {
            polled: candidates.len(),
            ..TickReport::default()
        };

        for record in candidates {
            match self.reconcile(&record).await {
                Ok(true) => report.transitions += 1,
                Ok(false) => {}
                Err(ReconcileError::Skipped) => report.failures += 1,
                Err(ReconcileError::StoreClosed) => break,
            }
        }

        report
    }

    /// Fetch and merge one record. `Ok(true)` when its status changed.
    async fn reconcile(&self, record: &VideoRecord) -> Result<bool, ReconcileError> {
        let Some(backend_id) = record.backend_id.as_deref() else {
            return Ok(false);
        };

        let remote = match tokio::time::timeout(self.fetch_timeout, self.backend.get_video(backend_id))
            .await
        {
            Ok(Ok(remote)) => remote,
            Ok(Err(e)) => {
                tracing::warn!(local_id = %record.local_id, backend_id, error = %e, "Status fetch failed");
                return Err(ReconcileError::Skipped);
            }
            Err(_) => {
                tracing::warn!(
                    local_id = %record.local_id,
                    backend_id,
                    timeout_secs = self.fetch_timeout.as_secs(),
                    "Status fetch timed out",
                );
                return Err(ReconcileError::Skipped);
            }
        };

        let status: VideoStatus = match remote.status.parse() {
            Ok(status) => status,
            Err(e) => {
                tracing::warn!(local_id = %record.local_id, backend_id, error = %e, "Unknown remote status");
                return Err(ReconcileError::Skipped);
            }
        };

        let mut transition = Transition::new(record.local_id.clone(), Trigger::RemoteStatus(status))
            .with_eta(remote.eta.clone());
        if let Some(progress) = remote.progress_percent() {
            transition = transition.with_progress(progress);
        }

        let applied = match self.store.dispatch(StoreEvent::Transition(transition)).await {
            Ok(applied) => applied,
            // Already logged by the store: raced an upload claim, a reset, or a regression.
            Err(IngestError::Rejected(_)) => return Ok(false),
            Err(_) => return Err(ReconcileError::StoreClosed),
        };

        let Some((from, to)) = applied.status_change() else {
            return Ok(false);
        };
        tracing::info!(local_id = %record.local_id, backend_id, %from, %to, "Remote status merged");

        match to {
            VideoStatus::Completed => self.bus.publish(
                Notification::success(
                    "Processing complete",
                    format!("{} has finished processing", record.name),
                )
                .for_video(Some(&record.local_id), &record.name),
            ),
            VideoStatus::Failed => {
                let message = match remote.error.as_deref() {
                    Some(reason) if !reason.is_empty() => {
                        format!("Processing of {} failed: {reason}", record.name)
                    }
                    _ => format!("Processing of {} failed", record.name),
                };
                self.bus.publish(
                    Notification::error("Processing failed", message)
                        .for_video(Some(&record.local_id), &record.name),
                );
            }
            _ => {}
        }

        Ok(true)
    }
}

enum ReconcileError {
    Skipped,
    StoreClosed,
}
