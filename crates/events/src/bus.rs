//! In-process notification bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`NotificationBus`] is the publish/subscribe hub for user-facing
//! [`Notification`]s. It is shared via `Arc<NotificationBus>`
//! between the ingestion services and the API's WebSocket forwarder.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use roadscan_core::types::{LocalId, Timestamp};

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// Severity of a notification, mapped to toast styling by the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Warning,
    Error,
}

/// A user-facing message about a video or an upload batch.
///
/// Constructed via the level helpers ([`success`](Notification::success),
/// [`error`](Notification::error), ...) and tied to a video with
/// [`for_video`](Notification::for_video).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub level: NotificationLevel,
    /// Short headline, e.g. `"Upload failed"`.
    pub title: String,
    /// Full message shown under the headline.
    pub message: String,
    /// Local record the notification concerns, if any.
    pub local_id: Option<LocalId>,
    /// File name of the video the notification concerns, if any.
    pub video_name: Option<String>,
    pub timestamp: Timestamp,
}

impl Notification {
    pub fn new(
        level: NotificationLevel,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            title: title.into(),
            message: message.into(),
            local_id: None,
            video_name: None,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }

    /// Attach the video this notification is about.
    pub fn for_video(mut self, local_id: Option<&str>, video_name: impl Into<String>) -> Self {
        self.local_id = local_id.map(str::to_string);
        self.video_name = Some(video_name.into());
        self
    }
}

// ---------------------------------------------------------------------------
// NotificationBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 256;

/// In-process fan-out notification bus.
///
/// ```rust
/// use roadscan_events::{Notification, NotificationBus};
///
/// let bus = NotificationBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(Notification::info("Survey created", "Route 5, 2025-01-01"));
/// ```
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl NotificationBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed messages are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish a notification to all current subscribers.
    ///
    /// Every notification is also logged.
    pub fn publish(&self, notification: Notification) {
        match notification.level {
            NotificationLevel::Error | NotificationLevel::Warning => tracing::warn!(
                title = %notification.title,
                local_id = notification.local_id.as_deref(),
                "{}",
                notification.message,
            ),
            _ => tracing::info!(
                title = %notification.title,
                local_id = notification.local_id.as_deref(),
                "{}",
                notification.message,
            ),
        }
        // SendError only means there are zero receivers.
        let _ = self.sender.send(notification);
    }

    /// Subscribe to all notifications published on this bus.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
