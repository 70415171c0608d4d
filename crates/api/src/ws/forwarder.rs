//! Fan-out of ingestion state to WebSocket clients.
//!
//! Every published store snapshot becomes a `videos_snapshot` frame and
//! every notification a `notification` frame. Snapshots are coalesced by
//! the watch channel, so a slow tick only ever sends the latest state. The
//! current snapshot is published once at startup so the first subscriber
//! has something to replay.

use std::sync::Arc;

use axum::extract::ws::Message;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use roadscan_core::ws_messages::{MSG_TYPE_NOTIFICATION, MSG_TYPE_VIDEOS_SNAPSHOT};
use roadscan_events::Notification;
use roadscan_ingest::{IngestManager, StoreSnapshot};

use crate::handlers::videos::VideoList;
use crate::ws::manager::WsManager;

#[derive(Serialize)]
struct Frame<'a, T: Serialize> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(flatten)]
    payload: &'a T,
}

fn text_frame<T: Serialize>(kind: &'static str, payload: &T) -> Option<Message> {
    match serde_json::to_string(&Frame { kind, payload }) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!(kind, error = %e, "Failed to serialize WebSocket frame");
            None
        }
    }
}

/// `{"type": "videos_snapshot", "records": [...], "activeUploads": [...], "isUploading": bool}`
pub fn snapshot_message(snapshot: &StoreSnapshot, is_uploading: bool) -> Option<Message> {
    text_frame(
        MSG_TYPE_VIDEOS_SNAPSHOT,
        &VideoList::from_snapshot(snapshot, is_uploading),
    )
}

/// `{"type": "notification", "id": ..., "level": ..., ...}`
pub fn notification_message(notification: &Notification) -> Option<Message> {
    text_frame(MSG_TYPE_NOTIFICATION, notification)
}

/// Spawn the forwarder. Runs until `cancel` fires or the ingestion
/// channels close.
pub fn start_forwarder(
    ingest: Arc<IngestManager>,
    ws_manager: Arc<WsManager>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut snapshots = ingest.subscribe();
        let mut notifications = ingest.notifications();

        let initial = snapshots.borrow_and_update().clone();
        if let Some(message) = snapshot_message(&initial, ingest.is_uploading()) {
            ws_manager.publish_snapshot(message).await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = snapshots.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let snapshot = snapshots.borrow_and_update().clone();
                    if let Some(message) = snapshot_message(&snapshot, ingest.is_uploading()) {
                        ws_manager.publish_snapshot(message).await;
                    }
                }
                received = notifications.recv() => match received {
                    Ok(notification) => {
                        if let Some(message) = notification_message(&notification) {
                            ws_manager.broadcast(message).await;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket forwarder lagged behind notifications");
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }

        tracing::info!("WebSocket forwarder stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json_of(message: Message) -> serde_json::Value {
        match message {
            Message::Text(text) => serde_json::from_str(text.as_str()).unwrap(),
            other => panic!("expected a text frame, got {other:?}"),
        }
    }

    #[test]
    fn snapshot_frame_is_tagged() {
        let json = json_of(snapshot_message(&StoreSnapshot::default(), true).unwrap());
        assert_eq!(json["type"], "videos_snapshot");
        assert_eq!(json["records"], serde_json::json!([]));
        assert_eq!(json["activeUploads"], serde_json::json!([]));
        assert_eq!(json["isUploading"], true);
    }

    #[test]
    fn notification_frame_carries_the_notification() {
        let notification =
            Notification::error("Upload failed", "boom").for_video(Some("local-1"), "a.mp4");
        let json = json_of(notification_message(&notification).unwrap());
        assert_eq!(json["type"], "notification");
        assert_eq!(json["level"], "error");
        assert_eq!(json["title"], "Upload failed");
        assert_eq!(json["localId"], "local-1");
        assert_eq!(json["videoName"], "a.mp4");
    }
}
