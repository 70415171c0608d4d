use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::ws::manager::WsManager;

/// Ping every dashboard subscriber each `period` until `cancel` fires.
///
/// Pings also prune subscribers whose socket pump has exited.
pub fn start_heartbeat(
    ws_manager: Arc<WsManager>,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticks.tick() => {
                    let reached = ws_manager.ping_all().await;
                    tracing::trace!(reached, "Dashboard heartbeat");
                }
            }
        }
    })
}
