#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tempfile::TempDir;
use tokio::sync::{watch, Mutex};

use roadscan_core::demo::DemoRegistry;
use roadscan_core::ffmpeg::FfmpegError;
use roadscan_events::{Notification, NotificationBus, NotificationLevel};
use roadscan_ingest::media::{MediaError, MediaTools};
use roadscan_ingest::{
    GpxFile, IngestConfig, IngestManager, StoreSnapshot, SurveyContext, UploadFile, VideoRecord,
};
use roadscan_remote::InMemoryBackend;

/// Canned JPEG bytes handed out by [`FakeMedia`].
pub const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0xFF, 0xD9];

// ---------------------------------------------------------------------------
// Fake media toolkit
// ---------------------------------------------------------------------------

/// [`MediaTools`] that never shells out.
pub struct FakeMedia {
    durations: Mutex<HashMap<String, f64>>,
    fail_probes: AtomicBool,
    fail_captures: AtomicBool,
    /// `true` while probes are parked.
    hold: watch::Sender<bool>,
}

impl FakeMedia {
    pub fn new() -> Self {
        let (hold, _) = watch::channel(false);
        Self {
            durations: Mutex::new(HashMap::new()),
            fail_probes: AtomicBool::new(false),
            fail_captures: AtomicBool::new(false),
            hold,
        }
    }

    pub async fn set_duration(&self, file_name: &str, secs: f64) {
        self.durations.lock().await.insert(file_name.to_string(), secs);
    }

    pub fn fail_probes(&self) {
        self.fail_probes.store(true, Ordering::SeqCst);
    }

    pub fn fail_captures(&self) {
        self.fail_captures.store(true, Ordering::SeqCst);
    }

    pub fn hold_probes(&self) {
        self.hold.send_replace(true);
    }

    pub fn release_probes(&self) {
        self.hold.send_replace(false);
    }
}

#[async_trait]
impl MediaTools for FakeMedia {
    async fn probe_duration(&self, path: &Path) -> Result<f64, MediaError> {
        let mut rx = self.hold.subscribe();
        let _ = rx.wait_for(|held| !*held).await;

        if self.fail_probes.load(Ordering::SeqCst) {
            return Err(FfmpegError::ParseError("no duration".into()).into());
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(self.durations.lock().await.get(&name).copied().unwrap_or(42.0))
    }

    async fn capture_frame(&self, _path: &Path, _offset_secs: f64) -> Result<Vec<u8>, MediaError> {
        if self.fail_captures.load(Ordering::SeqCst) {
            return Err(MediaError::EmptyFrame);
        }
        Ok(FAKE_JPEG.to_vec())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub manager: Arc<IngestManager>,
    pub backend: Arc<InMemoryBackend>,
    pub media: Arc<FakeMedia>,
    pub dir: TempDir,
}

/// Configuration with no demo delays and a poller that only runs when
/// driven by hand.
pub fn test_config() -> IngestConfig {
    IngestConfig {
        poll_interval: Duration::from_secs(3600),
        poll_fetch_timeout: Duration::from_millis(200),
        demo_step_delay: Duration::ZERO,
        ..IngestConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config())
}

pub fn harness_with(config: IngestConfig) -> Harness {
    let backend = Arc::new(InMemoryBackend::new());
    let media = Arc::new(FakeMedia::new());
    let manager = IngestManager::new(
        backend.clone(),
        media.clone(),
        DemoRegistry::builtin(),
        Arc::new(NotificationBus::default()),
        &config,
    );
    Harness {
        manager,
        backend,
        media,
        dir: tempfile::tempdir().expect("create temp dir"),
    }
}

pub fn survey() -> SurveyContext {
    SurveyContext {
        route_id: "R5".into(),
        survey_date: NaiveDate::from_ymd_opt(2025, 3, 14).expect("valid date"),
        surveyor_name: "Asha".into(),
    }
}

impl Harness {
    /// Write a video file of `size` bytes into the temp dir.
    pub fn file(&self, name: &str, size: usize) -> UploadFile {
        let path = self.dir.path().join(name);
        std::fs::write(&path, vec![7u8; size]).expect("write video fixture");
        UploadFile {
            path,
            name: name.to_string(),
            size: size as u64,
        }
    }

    pub fn gpx(&self, name: &str) -> GpxFile {
        let path = self.dir.path().join(name);
        std::fs::write(&path, b"<gpx version=\"1.1\"></gpx>").expect("write gpx fixture");
        GpxFile {
            path,
            name: name.to_string(),
        }
    }

    /// Upload the named files and wait for every transfer to finish.
    pub async fn upload_and_settle(&self, names: &[&str]) -> Vec<VideoRecord> {
        let files = names.iter().map(|n| self.file(n, 1024)).collect();
        let records = self
            .manager
            .upload_files(files, survey(), None)
            .await
            .expect("upload batch");
        self.manager.wait_idle().await;
        records
    }

    pub fn record(&self, local_id: &str) -> VideoRecord {
        self.manager
            .snapshot()
            .get(local_id)
            .cloned()
            .expect("record should exist")
    }
}

/// Wait until a published snapshot satisfies `pred`.
pub async fn wait_for_snapshot(
    manager: &IngestManager,
    pred: impl Fn(&StoreSnapshot) -> bool,
) -> Arc<StoreSnapshot> {
    let mut rx = manager.subscribe();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let current = rx.borrow_and_update().clone();
            if pred(&current) {
                return current;
            }
            rx.changed().await.expect("store closed");
        }
    })
    .await
    .expect("timed out waiting for snapshot")
}

/// Drain every notification currently queued on `rx`.
pub fn drain(rx: &mut tokio::sync::broadcast::Receiver<Notification>) -> Vec<Notification> {
    let mut out = Vec::new();
    while let Ok(n) = rx.try_recv() {
        out.push(n);
    }
    out
}

pub fn errors(notifications: &[Notification]) -> Vec<&Notification> {
    notifications
        .iter()
        .filter(|n| n.level == NotificationLevel::Error)
        .collect()
}
