//! Video lifecycle status and the authoritative transition table.
//!
//! Every write into the video record store names the trigger that caused
//! it. [`next_status`] checks the record's current status against the
//! accepted sources for that trigger and returns the destination, or a
//! [`CoreError::Validation`] describing the refused transition.
//!
//! Transition rules:
//! - `queue`      -> `uploading` (upload begins)
//! - `uploading`  -> `uploading` (progress, transfer finished), `error` (transfer failed)
//! - `uploading`  -> any later stage reported by the remote side
//! - `processing` -> `processing`, `completed`, `failed`, `error` reported by the remote side
//! - `uploading` / `uploaded` / `completed` / `error` / `failed` -> `queue` (real processing requested)
//! - `queue`      -> `processing` (confirmed), `uploaded` (rejected), `error`
//! - any          -> `processing` (demo processing)
//! - `processing` -> `completed` (demo), `error`
//! - any          -> `uploaded` (manual reset)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a single survey video.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoStatus {
    /// Remote row exists, transfer not started (or processing requested).
    Queue,
    /// Transfer in flight, or transferred and awaiting remote confirmation.
    Uploading,
    /// The remote side holds the full video.
    Uploaded,
    /// AI processing running.
    Processing,
    /// AI processing finished successfully.
    Completed,
    /// Local or network failure.
    Error,
    /// The remote pipeline reported a failure.
    Failed,
}

/// All statuses, in lifecycle order.
pub const ALL_STATUSES: &[VideoStatus] = &[
    VideoStatus::Queue,
    VideoStatus::Uploading,
    VideoStatus::Uploaded,
    VideoStatus::Processing,
    VideoStatus::Completed,
    VideoStatus::Error,
    VideoStatus::Failed,
];

impl VideoStatus {
    /// Wire name of the status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Uploading => "uploading",
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Failed => "failed",
        }
    }

    /// Position in the lifecycle. Terminal states share the last stage.
    pub fn stage(self) -> u8 {
        match self {
            Self::Queue => 0,
            Self::Uploading => 1,
            Self::Uploaded => 2,
            Self::Processing => 3,
            Self::Completed | Self::Error | Self::Failed => 4,
        }
    }

    /// Whether the remote side is expected to advance this record, making
    /// it a candidate for status polling.
    pub fn is_in_flight(self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }
}

impl fmt::Display for VideoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VideoStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_STATUSES
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| {
                CoreError::Validation(format!(
                    "Invalid video status '{s}'. Must be one of: {:?}",
                    ALL_STATUSES.iter().map(|st| st.as_str()).collect::<Vec<_>>()
                ))
            })
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

/// The cause of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    UploadStarted,
    UploadProgress,
    UploadFinished,
    UploadFailed,
    /// The poller observed this status on the remote side.
    RemoteStatus(VideoStatus),
    ProcessingRequested,
    ProcessingConfirmed,
    ProcessingRejected,
    DemoStarted,
    ProcessingProgress,
    ProcessingCompleted,
    ProcessingFailed,
    Reset,
}

impl Trigger {
    /// Short name used in log fields and rejection messages.
    pub fn name(self) -> &'static str {
        match self {
            Self::UploadStarted => "upload_started",
            Self::UploadProgress => "upload_progress",
            Self::UploadFinished => "upload_finished",
            Self::UploadFailed => "upload_failed",
            Self::RemoteStatus(_) => "remote_status",
            Self::ProcessingRequested => "processing_requested",
            Self::ProcessingConfirmed => "processing_confirmed",
            Self::ProcessingRejected => "processing_rejected",
            Self::DemoStarted => "demo_started",
            Self::ProcessingProgress => "processing_progress",
            Self::ProcessingCompleted => "processing_completed",
            Self::ProcessingFailed => "processing_failed",
            Self::Reset => "reset",
        }
    }
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// Resolve the destination status for `trigger` applied to `current`.
pub fn next_status(current: VideoStatus, trigger: Trigger) -> Result<VideoStatus, CoreError> {
    use VideoStatus::*;

    let next = match (current, trigger) {
        (Queue, Trigger::UploadStarted) => Some(Uploading),
        (Uploading, Trigger::UploadProgress | Trigger::UploadFinished) => Some(Uploading),
        (Uploading, Trigger::UploadFailed) => Some(Error),

        (Uploading, Trigger::RemoteStatus(remote)) if remote != Queue => Some(remote),
        (Processing, Trigger::RemoteStatus(remote)) if remote.stage() >= Processing.stage() => {
            Some(remote)
        }

        (
            Uploading | Uploaded | Completed | Error | Failed,
            Trigger::ProcessingRequested,
        ) => Some(Queue),
        (Queue, Trigger::ProcessingConfirmed) => Some(Processing),
        (Queue, Trigger::ProcessingRejected) => Some(Uploaded),

        (_, Trigger::DemoStarted) => Some(Processing),
        (Processing, Trigger::ProcessingProgress) => Some(Processing),
        (Processing, Trigger::ProcessingCompleted) => Some(Completed),
        (Queue | Processing, Trigger::ProcessingFailed) => Some(Error),

        (_, Trigger::Reset) => Some(Uploaded),

        _ => None,
    };

    next.ok_or_else(|| {
        CoreError::Validation(format!(
            "Cannot apply '{}' to a video in status '{current}'",
            describe(trigger)
        ))
    })
}

fn describe(trigger: Trigger) -> String {
    match trigger {
        Trigger::RemoteStatus(remote) => format!("remote_status:{remote}"),
        other => other.name().to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
