//! Wire types exchanged with the survey backend.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use roadscan_core::types::{BackendId, SurveyId};
use roadscan_core::video_status::VideoStatus;

/// Status a survey is created with when its videos start uploading.
pub const SURVEY_STATUS_UPLOADING: &str = "uploading";

/// Source tag stamped on assets inserted from a canned demo dataset.
pub const ASSET_SOURCE_DEMO: &str = "demo";

// ---------------------------------------------------------------------------
// Surveys and videos
// ---------------------------------------------------------------------------

/// Payload for creating a survey (one per upload batch).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSurvey {
    pub route_id: String,
    pub survey_date: NaiveDate,
    pub surveyor_name: String,
    pub status: String,
}

/// Payload for creating a remote video row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideo {
    pub survey_id: SurveyId,
    pub route_id: String,
    pub title: String,
    pub size_bytes: u64,
    pub duration_secs: f64,
    pub status: VideoStatus,
    pub progress: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: VideoStatus,
    pub progress: u8,
}

impl StatusUpdate {
    pub fn new(status: VideoStatus, progress: u8) -> Self {
        Self { status, progress }
    }
}

/// Remote view of a video, as returned by `get_video`.
///
/// `status` is kept as the raw string; callers parse it into a
/// [`VideoStatus`] and skip values they do not recognise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoteVideo {
    pub status: String,
    #[serde(default)]
    pub progress: Option<f64>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl RemoteVideo {
    /// Progress rounded and clamped to `0..=100`.
    pub fn progress_percent(&self) -> Option<u8> {
        self.progress
            .filter(|p| p.is_finite())
            .map(|p| p.round().clamp(0.0, 100.0) as u8)
    }
}

/// Result of a byte upload or a library copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    /// The backend extracted a GPS track from the video itself.
    #[serde(default)]
    pub gpx_created: bool,
}

/// Server-side copy of a file that already lives in the media library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryCopy {
    pub path: PathBuf,
    pub video_id: BackendId,
    pub survey_id: SurveyId,
    pub route_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb_path: Option<String>,
}

/// Response of `start_ai_processing`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StartProcessing {
    pub ok: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl StartProcessing {
    pub fn accepted() -> Self {
        Self {
            ok: true,
            message: None,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: Some(message.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Detections and assets
// ---------------------------------------------------------------------------

/// A single pre-computed detection from a demo dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub asset_type: String,
    #[serde(default)]
    pub category: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub confidence: Option<f64>,
    /// Offset into the video of the frame the detection came from.
    #[serde(default)]
    pub frame_time_secs: Option<f64>,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

/// Asset row inserted by `bulk_insert_assets`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRecord {
    pub video_id: BackendId,
    pub survey_id: Option<SurveyId>,
    pub route_id: String,
    pub asset_type: String,
    pub category: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub confidence: Option<f64>,
    pub frame_time_secs: Option<f64>,
    pub source: String,
    pub attributes: serde_json::Value,
}

impl AssetRecord {
    /// Tie a demo detection to the video, survey and route it belongs to.
    pub fn from_demo_detection(
        detection: &Detection,
        video_id: &str,
        survey_id: Option<&str>,
        route_id: &str,
    ) -> Self {
        Self {
            video_id: video_id.to_string(),
            survey_id: survey_id.map(str::to_string),
            route_id: route_id.to_string(),
            asset_type: detection.asset_type.clone(),
            category: detection.category.clone(),
            latitude: detection.latitude,
            longitude: detection.longitude,
            confidence: detection.confidence,
            frame_time_secs: detection.frame_time_secs,
            source: ASSET_SOURCE_DEMO.to_string(),
            attributes: detection.attributes.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Upload progress
// ---------------------------------------------------------------------------

/// Bytes transferred so far for one upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub sent: u64,
    pub total: u64,
}

impl UploadProgress {
    /// Percentage in `0..=100`. A zero-byte file counts as complete.
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        let pct = self.sent.min(self.total) as f64 / self.total as f64 * 100.0;
        pct.round() as u8
    }
}

/// Callback invoked as upload bytes leave the process.
pub type ProgressFn = Arc<dyn Fn(UploadProgress) + Send + Sync>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_percent_rounds_and_clamps() {
        assert_eq!(UploadProgress { sent: 0, total: 200 }.percent(), 0);
        assert_eq!(UploadProgress { sent: 101, total: 200 }.percent(), 51);
        assert_eq!(UploadProgress { sent: 500, total: 200 }.percent(), 100);
        assert_eq!(UploadProgress { sent: 0, total: 0 }.percent(), 100);
    }

    #[test]
    fn remote_video_tolerates_missing_fields() {
        let video: RemoteVideo = serde_json::from_str(r#"{"status": "processing"}"#).unwrap();
        assert_eq!(video.status, "processing");
        assert_eq!(video.progress_percent(), None);
        assert!(video.eta.is_none());
    }

    #[test]
    fn remote_progress_is_clamped() {
        let video = RemoteVideo {
            status: "processing".into(),
            progress: Some(140.2),
            ..Default::default()
        };
        assert_eq!(video.progress_percent(), Some(100));
    }

    #[test]
    fn upload_outcome_defaults_gpx_created() {
        let outcome: UploadOutcome = serde_json::from_str("{}").unwrap();
        assert!(!outcome.gpx_created);
        let outcome: UploadOutcome = serde_json::from_str(r#"{"gpxCreated": true}"#).unwrap();
        assert!(outcome.gpx_created);
    }

    #[test]
    fn demo_detection_becomes_asset() {
        let detection = Detection {
            asset_type: "street_light".into(),
            category: Some("lighting".into()),
            latitude: 12.97,
            longitude: 77.59,
            confidence: Some(0.91),
            frame_time_secs: Some(4.2),
            attributes: serde_json::json!({"side": "left"}),
        };
        let asset = AssetRecord::from_demo_detection(&detection, "v-1", Some("s-1"), "R5");
        assert_eq!(asset.video_id, "v-1");
        assert_eq!(asset.survey_id.as_deref(), Some("s-1"));
        assert_eq!(asset.source, ASSET_SOURCE_DEMO);
        assert_eq!(asset.attributes["side"], "left");
    }
}
