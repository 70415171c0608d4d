//! The local video record, one per file the user selected.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use roadscan_core::types::{BackendId, LocalId, SurveyId, Timestamp};
use roadscan_core::video_status::VideoStatus;

/// Survey metadata supplied with an upload batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurveyContext {
    pub route_id: String,
    pub survey_date: NaiveDate,
    pub surveyor_name: String,
}

/// Client-side record tracking a single survey video.
///
/// `local_id` is assigned here and never reused. `backend_id` is set once,
/// right after the remote row is created, and never changes. `name`, `size`
/// and `duration` are fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRecord {
    pub local_id: LocalId,
    pub backend_id: Option<BackendId>,
    pub name: String,
    /// Bytes.
    pub size: u64,
    /// Seconds.
    pub duration: f64,
    pub status: VideoStatus,
    /// Percentage, 0 to 100.
    pub progress: u8,
    /// Remote-sourced estimate of the time left.
    pub eta: Option<String>,
    pub route_id: String,
    pub survey_date: NaiveDate,
    pub surveyor_name: String,
    pub survey_id: Option<SurveyId>,
    pub gpx_file: Option<String>,
    pub thumbnail_url: Option<String>,
    pub created_at: Timestamp,
}

impl VideoRecord {
    /// A fresh record for a video whose remote row was just created.
    pub fn new(
        name: impl Into<String>,
        size: u64,
        duration: f64,
        survey: &SurveyContext,
        survey_id: &str,
        backend_id: BackendId,
        status: VideoStatus,
    ) -> Self {
        Self {
            local_id: uuid::Uuid::new_v4().to_string(),
            backend_id: Some(backend_id),
            name: name.into(),
            size,
            duration,
            status,
            progress: 0,
            eta: None,
            route_id: survey.route_id.clone(),
            survey_date: survey.survey_date,
            surveyor_name: survey.surveyor_name.clone(),
            survey_id: Some(survey_id.to_string()),
            gpx_file: None,
            thumbnail_url: None,
            created_at: chrono::Utc::now(),
        }
    }
}
