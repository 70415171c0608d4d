//! Video Record Store.
//!
//! A single actor task owns [`StoreState`] and applies [`StoreEvent`]s one
//! at a time, in the order they arrive on its channel. Every status write
//! names its [`Trigger`] and is checked against the transition table in
//! [`roadscan_core::video_status`]; refused events leave the record
//! untouched and are logged.
//!
//! The state also holds record ownership: an upload task claims a record
//! before transferring and releases it when done. While a record is owned,
//! remote-status merges and processing requests for it are refused, so the
//! reconciliation poller can never overwrite a live upload.
//!
//! After each event that changes something, a fresh [`StoreSnapshot`] is
//! published on a `watch` channel.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};

use roadscan_core::error::CoreError;
use roadscan_core::types::LocalId;
use roadscan_core::video_status::{next_status, Trigger, VideoStatus};

use crate::error::IngestError;
use crate::record::VideoRecord;

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// A status write: the trigger plus the values that travel with it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub local_id: LocalId,
    pub trigger: Trigger,
    pub progress: Option<u8>,
    /// Only remote-status merges carry an ETA; it replaces the stored one.
    pub eta: Option<String>,
}

impl Transition {
    pub fn new(local_id: impl Into<LocalId>, trigger: Trigger) -> Self {
        Self {
            local_id: local_id.into(),
            trigger,
            progress: None,
            eta: None,
        }
    }

    pub fn with_progress(mut self, progress: u8) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_eta(mut self, eta: Option<String>) -> Self {
        self.eta = eta;
        self
    }
}

/// Every write into the store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    Insert(VideoRecord),
    Remove(LocalId),
    Transition(Transition),
    /// Take ownership for an upload task. A `queue` record moves to
    /// `uploading` with progress 0; an `uploading` record keeps its status.
    Claim(LocalId),
    Release(LocalId),
    SetThumbnail { local_id: LocalId, url: String },
    SetGpxFile { local_id: LocalId, file_name: String },
}

impl StoreEvent {
    pub fn local_id(&self) -> &str {
        match self {
            Self::Insert(record) => &record.local_id,
            Self::Remove(id) | Self::Claim(id) | Self::Release(id) => id,
            Self::Transition(t) => &t.local_id,
            Self::SetThumbnail { local_id, .. } | Self::SetGpxFile { local_id, .. } => local_id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Insert(_) => "insert",
            Self::Remove(_) => "remove",
            Self::Transition(t) => t.trigger.name(),
            Self::Claim(_) => "claim",
            Self::Release(_) => "release",
            Self::SetThumbnail { .. } => "set_thumbnail",
            Self::SetGpxFile { .. } => "set_gpx_file",
        }
    }
}

/// The record as it was before and after an applied event. `None` means
/// the record did not exist on that side.
#[derive(Debug, Clone, PartialEq)]
pub struct Applied {
    pub before: Option<VideoRecord>,
    pub after: Option<VideoRecord>,
    /// The record entered or left `active_uploads`.
    pub ownership_changed: bool,
}

impl Applied {
    /// `(from, to)` when the event moved the record to a different status.
    pub fn status_change(&self) -> Option<(VideoStatus, VideoStatus)> {
        match (&self.before, &self.after) {
            (Some(before), Some(after)) if before.status != after.status => {
                Some((before.status, after.status))
            }
            _ => None,
        }
    }

    fn is_noop(&self) -> bool {
        self.before == self.after && !self.ownership_changed
    }
}

/// Why the store refused an event.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreRejection {
    #[error("Video not found: {0}")]
    UnknownVideo(LocalId),

    #[error("Video {0} already exists")]
    Duplicate(LocalId),

    #[error("Video {0} is being uploaded")]
    Owned(LocalId),

    #[error("Video {0} is not owned by an upload")]
    NotOwned(LocalId),

    #[error("{0}")]
    Transition(String),
}

impl From<CoreError> for StoreRejection {
    fn from(err: CoreError) -> Self {
        Self::Transition(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// State and reducer
// ---------------------------------------------------------------------------

/// Immutable view of the store published after each change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    /// Records in insertion order.
    pub records: Vec<VideoRecord>,
    /// Records currently claimed by an upload task.
    pub active_uploads: BTreeSet<LocalId>,
}

impl StoreSnapshot {
    pub fn get(&self, local_id: &str) -> Option<&VideoRecord> {
        self.records.iter().find(|r| r.local_id == local_id)
    }

    pub fn is_owned(&self, local_id: &str) -> bool {
        self.active_uploads.contains(local_id)
    }
}

/// The reducer state. Only the store actor mutates it.
#[derive(Debug, Default)]
pub struct StoreState {
    records: Vec<VideoRecord>,
    active_uploads: BTreeSet<LocalId>,
}

impl StoreState {
    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            records: self.records.clone(),
            active_uploads: self.active_uploads.clone(),
        }
    }

    fn position(&self, local_id: &str) -> Result<usize, StoreRejection> {
        self.records
            .iter()
            .position(|r| r.local_id == local_id)
            .ok_or_else(|| StoreRejection::UnknownVideo(local_id.to_string()))
    }

    /// Apply one event. On rejection nothing changes.
    pub fn apply(&mut self, event: StoreEvent) -> Result<Applied, StoreRejection> {
        match event {
            StoreEvent::Insert(record) => {
                if self.position(&record.local_id).is_ok() {
                    return Err(StoreRejection::Duplicate(record.local_id));
                }
                self.records.push(record.clone());
                Ok(Applied {
                    before: None,
                    after: Some(record),
                    ownership_changed: false,
                })
            }

            StoreEvent::Remove(local_id) => {
                let idx = self.position(&local_id)?;
                let removed = self.records.remove(idx);
                let was_owned = self.active_uploads.remove(&local_id);
                Ok(Applied {
                    before: Some(removed),
                    after: None,
                    ownership_changed: was_owned,
                })
            }

            StoreEvent::Claim(local_id) => {
                let idx = self.position(&local_id)?;
                if self.active_uploads.contains(&local_id) {
                    return Err(StoreRejection::Owned(local_id));
                }
                let before = self.records[idx].clone();
                let mut after = before.clone();
                match before.status {
                    VideoStatus::Queue => {
                        after.status = next_status(before.status, Trigger::UploadStarted)?;
                        after.progress = 0;
                    }
                    VideoStatus::Uploading => {}
                    other => {
                        return Err(StoreRejection::Transition(format!(
                            "Cannot claim a video in status '{other}' for upload"
                        )))
                    }
                }
                self.active_uploads.insert(local_id);
                self.records[idx] = after.clone();
                Ok(Applied {
                    before: Some(before),
                    after: Some(after),
                    ownership_changed: true,
                })
            }

            StoreEvent::Release(local_id) => {
                if !self.active_uploads.remove(&local_id) {
                    return Err(StoreRejection::NotOwned(local_id));
                }
                let record = self.position(&local_id).ok().map(|i| self.records[i].clone());
                Ok(Applied {
                    before: record.clone(),
                    after: record,
                    ownership_changed: true,
                })
            }

            StoreEvent::Transition(transition) => self.apply_transition(transition),

            StoreEvent::SetThumbnail { local_id, url } => {
                self.update(&local_id, |record| record.thumbnail_url = Some(url))
            }

            StoreEvent::SetGpxFile {
                local_id,
                file_name,
            } => self.update(&local_id, |record| record.gpx_file = Some(file_name)),
        }
    }

    fn update(
        &mut self,
        local_id: &str,
        f: impl FnOnce(&mut VideoRecord),
    ) -> Result<Applied, StoreRejection> {
        let idx = self.position(local_id)?;
        let before = self.records[idx].clone();
        let mut after = before.clone();
        f(&mut after);
        self.records[idx] = after.clone();
        Ok(Applied {
            before: Some(before),
            after: Some(after),
            ownership_changed: false,
        })
    }

    fn apply_transition(&mut self, t: Transition) -> Result<Applied, StoreRejection> {
        let idx = self.position(&t.local_id)?;
        let owned = self.active_uploads.contains(&t.local_id);

        match t.trigger {
            Trigger::RemoteStatus(_) | Trigger::ProcessingRequested | Trigger::DemoStarted
                if owned =>
            {
                return Err(StoreRejection::Owned(t.local_id));
            }
            Trigger::UploadStarted
            | Trigger::UploadProgress
            | Trigger::UploadFinished
            | Trigger::UploadFailed
                if !owned =>
            {
                return Err(StoreRejection::NotOwned(t.local_id));
            }
            _ => {}
        }

        let before = self.records[idx].clone();
        let status = next_status(before.status, t.trigger)?;
        let mut after = before.clone();
        after.status = status;

        match t.trigger {
            Trigger::UploadStarted
            | Trigger::ProcessingRequested
            | Trigger::ProcessingRejected
            | Trigger::DemoStarted
            | Trigger::Reset => after.progress = 0,
            Trigger::UploadProgress | Trigger::UploadFinished => {
                after.progress = before.progress.max(t.progress.unwrap_or(before.progress));
            }
            Trigger::RemoteStatus(_) => {
                let remote = t.progress.unwrap_or(before.progress);
                after.progress = if status == VideoStatus::Uploading {
                    before.progress.max(remote)
                } else {
                    remote
                };
                after.eta = t.eta;
            }
            Trigger::ProcessingCompleted => after.progress = 100,
            Trigger::ProcessingConfirmed | Trigger::ProcessingProgress => {
                if let Some(progress) = t.progress {
                    after.progress = progress;
                }
            }
            Trigger::UploadFailed | Trigger::ProcessingFailed => {}
        }
        after.progress = after.progress.min(100);
        if t.trigger == Trigger::Reset {
            after.eta = None;
        }

        self.records[idx] = after.clone();
        Ok(Applied {
            before: Some(before),
            after: Some(after),
            ownership_changed: false,
        })
    }
}

// ---------------------------------------------------------------------------
// Actor handle
// ---------------------------------------------------------------------------

type Reply = oneshot::Sender<Result<Applied, StoreRejection>>;

struct Envelope {
    event: StoreEvent,
    reply: Option<Reply>,
}

/// Cloneable handle to the store actor.
///
/// The actor exits once every handle has been dropped.
#[derive(Clone)]
pub struct RecordStore {
    tx: mpsc::UnboundedSender<Envelope>,
    snapshots: watch::Receiver<Arc<StoreSnapshot>>,
}

impl RecordStore {
    /// Spawn the actor on the current runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshots) = watch::channel(Arc::new(StoreSnapshot::default()));
        tokio::spawn(run_store(rx, snapshot_tx));
        Self { tx, snapshots }
    }

    /// Apply an event and wait for the outcome.
    pub async fn dispatch(&self, event: StoreEvent) -> Result<Applied, IngestError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                event,
                reply: Some(reply),
            })
            .map_err(|_| IngestError::StoreClosed)?;
        let outcome = rx.await.map_err(|_| IngestError::StoreClosed)?;
        Ok(outcome?)
    }

    /// Queue an event without waiting. Used from synchronous callbacks;
    /// ordering relative to other events from the same caller is kept.
    pub fn dispatch_nowait(&self, event: StoreEvent) {
        if self.tx.send(Envelope { event, reply: None }).is_err() {
            tracing::debug!("Video record store closed, event dropped");
        }
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Arc<StoreSnapshot> {
        self.snapshots.borrow().clone()
    }

    /// A receiver that observes every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<Arc<StoreSnapshot>> {
        self.snapshots.clone()
    }
}

async fn run_store(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    snapshots: watch::Sender<Arc<StoreSnapshot>>,
) {
    let mut state = StoreState::default();

    while let Some(Envelope { event, reply }) = rx.recv().await {
        let local_id = event.local_id().to_string();
        let name = event.name();
        let outcome = state.apply(event);

        match &outcome {
            Ok(applied) if !applied.is_noop() => {
                snapshots.send_replace(Arc::new(state.snapshot()));
            }
            Ok(_) => {}
            Err(rejection) => {
                tracing::warn!(local_id = %local_id, event = name, reason = %rejection, "Store event rejected");
            }
        }

        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    tracing::debug!("Video record store stopped");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
