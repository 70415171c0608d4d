//! Handlers for the `/videos` resource.
//!
//! Records are addressed by their local id. Upload endpoints spool the
//! multipart body to disk first and answer `202 Accepted` as soon as the
//! records are registered; transfer progress then arrives over the
//! WebSocket feed.

use std::path::Path as FsPath;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use validator::Validate;

use roadscan_core::error::CoreError;
use roadscan_core::types::LocalId;
use roadscan_ingest::{
    GpxFile, LibraryImport, ProcessingOutcome, StoreSnapshot, SurveyContext, UploadFile,
    VideoRecord,
};
use roadscan_remote::Detection;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::spool;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// The record list as shown on the dashboard.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoList {
    pub records: Vec<VideoRecord>,
    /// Records currently held by an upload task.
    pub active_uploads: Vec<LocalId>,
    pub is_uploading: bool,
}

impl VideoList {
    pub fn from_snapshot(snapshot: &StoreSnapshot, is_uploading: bool) -> Self {
        Self {
            records: snapshot.records.clone(),
            active_uploads: snapshot.active_uploads.iter().cloned().collect(),
            is_uploading,
        }
    }
}

/// Survey fields sent alongside a batch upload.
#[derive(Debug, Default, Validate)]
pub struct SurveyForm {
    #[validate(length(min = 1, message = "route_id is required"))]
    pub route_id: String,
    #[validate(length(min = 1, message = "survey_date is required"))]
    pub survey_date: String,
    #[validate(length(min = 1, message = "surveyor_name is required"))]
    pub surveyor_name: String,
}

impl SurveyForm {
    fn into_context(self) -> AppResult<SurveyContext> {
        let survey_date = NaiveDate::parse_from_str(&self.survey_date, "%Y-%m-%d").map_err(|_| {
            AppError::BadRequest(format!(
                "survey_date must be YYYY-MM-DD, got '{}'",
                self.survey_date
            ))
        })?;
        Ok(SurveyContext {
            route_id: self.route_id,
            survey_date,
            surveyor_name: self.surveyor_name,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct LibraryImportRequest {
    /// Library path of the stored video.
    #[validate(length(min = 1, message = "path is required"))]
    pub path: String,
    pub size: u64,
    pub thumb_path: Option<String>,
    #[validate(length(min = 1, message = "route_id is required"))]
    pub route_id: String,
    pub survey_date: NaiveDate,
    #[validate(length(min = 1, message = "surveyor_name is required"))]
    pub surveyor_name: String,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    /// `"demo"` or `"started"`.
    pub mode: &'static str,
    /// Detections loaded, for demo videos.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detections: Option<usize>,
}

impl From<ProcessingOutcome> for ProcessResponse {
    fn from(outcome: ProcessingOutcome) -> Self {
        match outcome {
            ProcessingOutcome::Demo { detections } => Self {
                mode: "demo",
                detections: Some(detections),
            },
            ProcessingOutcome::Started => Self {
                mode: "started",
                detections: None,
            },
        }
    }
}

/// Parsed multipart body of a batch upload.
#[derive(Default)]
struct UploadForm {
    survey: SurveyForm,
    files: Vec<UploadFile>,
    gpx: Option<GpxFile>,
}

impl UploadForm {
    /// Remove every part spooled so far.
    async fn discard(&self) {
        let paths: Vec<&std::path::PathBuf> = self
            .files
            .iter()
            .map(|f| &f.path)
            .chain(self.gpx.iter().map(|g| &g.path))
            .collect();
        spool::discard(paths).await;
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /api/v1/videos
pub async fn list_videos(State(state): State<AppState>) -> Json<DataResponse<VideoList>> {
    let snapshot = state.ingest.snapshot();
    Json(DataResponse {
        data: VideoList::from_snapshot(&snapshot, state.ingest.is_uploading()),
    })
}

/// POST /api/v1/videos/upload
///
/// Multipart fields: one or more `files`, an optional `gpx`, and the text
/// fields `route_id`, `survey_date` (`YYYY-MM-DD`) and `surveyor_name`.
/// Once the batch is handed over, the orchestrator owns the spooled parts.
pub async fn upload_videos(
    State(state): State<AppState>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<Vec<VideoRecord>>>)> {
    let mut form = UploadForm::default();
    if let Err(e) = read_upload_form(multipart, &state.config.spool_dir, &mut form).await {
        form.discard().await;
        return Err(e);
    }
    let survey = match std::mem::take(&mut form.survey).into_context() {
        Ok(survey) => survey,
        Err(e) => {
            form.discard().await;
            return Err(e);
        }
    };
    let UploadForm { files, gpx, .. } = form;

    tracing::info!(
        files = files.len(),
        gpx = gpx.is_some(),
        route_id = %survey.route_id,
        "Batch upload received",
    );

    let records = state.ingest.upload_files(files, survey, gpx).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: records })))
}

/// POST /api/v1/videos/library
pub async fn import_from_library(
    State(state): State<AppState>,
    Json(input): Json<LibraryImportRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<VideoRecord>>)> {
    input.validate()?;

    let survey = SurveyContext {
        route_id: input.route_id,
        survey_date: input.survey_date,
        surveyor_name: input.surveyor_name,
    };
    let import = LibraryImport {
        path: input.path.into(),
        size: input.size,
        thumb_path: input.thumb_path,
    };

    let record = state.ingest.upload_from_library(import, survey).await?;
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: record })))
}

/// POST /api/v1/videos/{local_id}/retry
pub async fn retry_upload(
    State(state): State<AppState>,
    Path(local_id): Path<LocalId>,
) -> AppResult<StatusCode> {
    state.ingest.retry_upload(&local_id).await?;
    Ok(StatusCode::ACCEPTED)
}

/// DELETE /api/v1/videos/{local_id}
///
/// Removes the local record only; the remote row is left alone.
pub async fn remove_video(
    State(state): State<AppState>,
    Path(local_id): Path<LocalId>,
) -> AppResult<Json<DataResponse<VideoRecord>>> {
    let record = state.ingest.remove_video(&local_id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// POST /api/v1/videos/{local_id}/gpx
///
/// Multipart with a single `gpx` file part.
pub async fn attach_gpx(
    State(state): State<AppState>,
    Path(local_id): Path<LocalId>,
    mut multipart: Multipart,
) -> AppResult<Json<DataResponse<VideoRecord>>> {
    let dir = &state.config.spool_dir;
    let mut gpx: Option<GpxFile> = None;
    let read = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?
        {
            if field.name() == Some("gpx") {
                let spooled = spool::spool_field(field, dir).await?;
                if let Some(previous) = gpx.take() {
                    spool::discard([&previous.path]).await;
                }
                gpx = Some(GpxFile {
                    path: spooled.path,
                    name: spooled.name,
                });
            }
        }
        Ok::<_, AppError>(())
    };
    let read = read.await;

    let Some(gpx) = gpx else {
        read?;
        return Err(AppError::BadRequest("Missing 'gpx' file part".to_string()));
    };
    if let Err(e) = read {
        spool::discard([&gpx.path]).await;
        return Err(e);
    }

    let spooled = gpx.path.clone();
    let result = state.ingest.upload_gpx_for_video(&local_id, gpx).await;
    spool::discard([&spooled]).await;
    Ok(Json(DataResponse { data: result? }))
}

/// POST /api/v1/videos/{local_id}/process
pub async fn process_video(
    State(state): State<AppState>,
    Path(local_id): Path<LocalId>,
) -> AppResult<Json<DataResponse<ProcessResponse>>> {
    let outcome = state.ingest.process_with_ai(&local_id).await?;
    Ok(Json(DataResponse {
        data: outcome.into(),
    }))
}

/// POST /api/v1/videos/{local_id}/reset
pub async fn reset_video(
    State(state): State<AppState>,
    Path(local_id): Path<LocalId>,
) -> AppResult<Json<DataResponse<VideoRecord>>> {
    let record = state.ingest.reset_video_status(&local_id).await?;
    Ok(Json(DataResponse { data: record }))
}

/// GET /api/v1/videos/{local_id}/detections
///
/// 404 when the video is unknown or no demo dataset has been loaded for it.
pub async fn demo_detections(
    State(state): State<AppState>,
    Path(local_id): Path<LocalId>,
) -> AppResult<Json<DataResponse<Vec<Detection>>>> {
    let detections = state
        .ingest
        .demo_detections(&local_id)
        .await?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Demo detections",
            id: local_id.clone(),
        })?;
    Ok(Json(DataResponse {
        data: detections.as_ref().clone(),
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fill `form` from the multipart body. Parts spooled before an error stay
/// recorded in `form` so the caller can remove them.
async fn read_upload_form(
    mut multipart: Multipart,
    dir: &FsPath,
    form: &mut UploadForm,
) -> AppResult<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "files" => {
                let spooled = spool::spool_field(field, dir).await?;
                form.files.push(UploadFile {
                    path: spooled.path,
                    name: spooled.name,
                    size: spooled.size,
                });
            }
            "gpx" => {
                let spooled = spool::spool_field(field, dir).await?;
                if let Some(previous) = form.gpx.take() {
                    spool::discard([&previous.path]).await;
                }
                form.gpx = Some(GpxFile {
                    path: spooled.path,
                    name: spooled.name,
                });
            }
            "route_id" | "survey_date" | "surveyor_name" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(e.to_string()))?
                    .trim()
                    .to_string();
                match field_name.as_str() {
                    "route_id" => form.survey.route_id = value,
                    "survey_date" => form.survey.survey_date = value,
                    _ => form.survey.surveyor_name = value,
                }
            }
            other => tracing::debug!(field = other, "Ignoring unknown multipart field"),
        }
    }

    form.survey.validate()?;
    if form.files.is_empty() {
        return Err(AppError::BadRequest(
            "No video files received in multipart upload".to_string(),
        ));
    }
    Ok(())
}
