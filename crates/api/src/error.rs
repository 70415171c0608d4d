use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use roadscan_core::error::CoreError;
use roadscan_ingest::store::StoreRejection;
use roadscan_ingest::IngestError;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`IngestError`] and [`CoreError`] and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Core(#[from] CoreError),

    /// Request body failed field validation.
    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Ingest(err) => classify_ingest_error(err),

            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    internal()
                }
            },

            AppError::Validation(errors) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                errors.to_string(),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                internal()
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Map an ingestion failure to an HTTP status, error code, and message.
///
/// - Unknown videos map to 404.
/// - State-machine refusals and unregistered videos map to 409.
/// - Retry maps to 501.
/// - Backend failures and rejections map to 502.
fn classify_ingest_error(err: &IngestError) -> (StatusCode, &'static str, String) {
    match err {
        IngestError::UnknownVideo(_) | IngestError::Rejected(StoreRejection::UnknownVideo(_)) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", err.to_string())
        }
        IngestError::NotRegistered { .. } | IngestError::Rejected(_) => {
            (StatusCode::CONFLICT, "CONFLICT", err.to_string())
        }
        IngestError::RetryUnsupported { .. } => {
            (StatusCode::NOT_IMPLEMENTED, "NOT_IMPLEMENTED", err.to_string())
        }
        IngestError::ProcessingRejected { .. } => {
            (StatusCode::BAD_GATEWAY, "PROCESSING_REJECTED", err.to_string())
        }
        IngestError::Remote { .. } | IngestError::EmptyBatch { .. } => {
            (StatusCode::BAD_GATEWAY, "BACKEND_ERROR", err.to_string())
        }
        IngestError::StoreClosed | IngestError::Io(_) => {
            tracing::error!(error = %err, "Ingestion error");
            internal()
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "INTERNAL_ERROR",
        "An internal error occurred".to_string(),
    )
}
