use roadscan_core::types::LocalId;
use roadscan_remote::RemoteError;

use crate::store::StoreRejection;

/// Errors returned by the ingestion operations.
///
/// Every failure that concerns a specific video is also published as a
/// user-facing notification before it is returned.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Video not found: {0}")]
    UnknownVideo(LocalId),

    #[error("Video '{name}' is not registered with the backend yet")]
    NotRegistered { local_id: LocalId, name: String },

    #[error("Retrying the upload of '{name}' is not implemented; please upload the file again")]
    RetryUnsupported { local_id: LocalId, name: String },

    #[error("AI processing for '{name}' was rejected: {message}")]
    ProcessingRejected {
        local_id: LocalId,
        name: String,
        message: String,
    },

    #[error("Backend request for '{name}' failed: {source}")]
    Remote {
        name: String,
        #[source]
        source: RemoteError,
    },

    #[error("No video could be registered for survey {survey_id}")]
    EmptyBatch { survey_id: String },

    #[error(transparent)]
    Rejected(#[from] StoreRejection),

    #[error("Video record store is closed")]
    StoreClosed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl IngestError {
    pub fn remote(name: impl Into<String>, source: RemoteError) -> Self {
        Self::Remote {
            name: name.into(),
            source,
        }
    }
}
