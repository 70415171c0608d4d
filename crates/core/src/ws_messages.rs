//! WebSocket message type constants for the dashboard feed.
//!
//! Used by the API's broadcast forwarder when pushing store snapshots and
//! user-facing notifications to connected browser clients.

/// Full snapshot of the video record list.
pub const MSG_TYPE_VIDEOS_SNAPSHOT: &str = "videos_snapshot";

/// A user-facing notification (success, error, info).
pub const MSG_TYPE_NOTIFICATION: &str = "notification";
