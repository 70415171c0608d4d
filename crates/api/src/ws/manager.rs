//! Registry of dashboard feed subscribers.
//!
//! Besides fanning frames out, the manager remembers the most recent
//! `videos_snapshot` frame and queues it for every new subscriber, so a
//! dashboard that connects between two store changes still starts from the
//! full record list. Subscribers whose queue has closed are pruned on the
//! next fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

use roadscan_core::types::Timestamp;

/// Identifier handed out by [`WsManager::connect`].
pub type ConnId = u64;

/// Outbound frame queue of one subscriber.
pub type FrameReceiver = mpsc::UnboundedReceiver<Message>;

struct Subscriber {
    sender: mpsc::UnboundedSender<Message>,
    connected_at: Timestamp,
}

/// Lock order is `latest_snapshot` before `subscribers`.
#[derive(Default)]
pub struct WsManager {
    next_id: AtomicU64,
    latest_snapshot: RwLock<Option<Message>>,
    subscribers: RwLock<HashMap<ConnId, Subscriber>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber. The latest snapshot frame, when one has been
    /// published, is already queued on the returned receiver.
    pub async fn connect(&self) -> (ConnId, FrameReceiver) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let (sender, rx) = mpsc::unbounded_channel();

        let latest = self.latest_snapshot.read().await;
        if let Some(frame) = latest.as_ref() {
            let _ = sender.send(frame.clone());
        }
        self.subscribers.write().await.insert(
            id,
            Subscriber {
                sender,
                connected_at: chrono::Utc::now(),
            },
        );
        (id, rx)
    }

    /// Drop a subscriber, returning how long it was connected.
    pub async fn disconnect(&self, id: ConnId) -> Option<chrono::TimeDelta> {
        self.subscribers
            .write()
            .await
            .remove(&id)
            .map(|sub| chrono::Utc::now() - sub.connected_at)
    }

    /// Replace the cached snapshot frame and send it to every subscriber.
    /// Returns the number of subscribers reached.
    pub async fn publish_snapshot(&self, frame: Message) -> usize {
        let mut latest = self.latest_snapshot.write().await;
        *latest = Some(frame.clone());
        self.fan_out(frame).await
    }

    /// Send a one-off frame to every subscriber. Unlike snapshots it is not
    /// replayed to later subscribers.
    pub async fn broadcast(&self, frame: Message) -> usize {
        self.fan_out(frame).await
    }

    /// Queue a Ping frame for every subscriber.
    pub async fn ping_all(&self) -> usize {
        self.fan_out(Message::Ping(Bytes::new())).await
    }

    pub async fn connection_count(&self) -> usize {
        self.subscribers.read().await.len()
    }

    /// Send a Close frame to every subscriber and forget them all.
    pub async fn shutdown_all(&self) {
        let mut subs = self.subscribers.write().await;
        let count = subs.len();
        for (_, sub) in subs.drain() {
            let _ = sub.sender.send(Message::Close(None));
        }
        tracing::info!(count, "Closed all dashboard subscribers");
    }

    async fn fan_out(&self, frame: Message) -> usize {
        let mut closed = Vec::new();
        let mut delivered = 0;
        {
            let subs = self.subscribers.read().await;
            for (id, sub) in subs.iter() {
                if sub.sender.send(frame.clone()).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            let mut subs = self.subscribers.write().await;
            for id in &closed {
                subs.remove(id);
            }
            tracing::debug!(pruned = closed.len(), "Pruned closed dashboard subscribers");
        }
        delivered
    }
}
