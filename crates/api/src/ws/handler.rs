use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;
use crate::ws::manager::WsManager;

/// GET /api/v1/ws
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_dashboard(socket, state.ws_manager))
}

/// Pump feed frames to one dashboard until either side goes away.
///
/// The feed is server-to-client; inbound frames other than Close are
/// ignored.
async fn serve_dashboard(socket: WebSocket, ws_manager: Arc<WsManager>) {
    let (conn_id, mut frames) = ws_manager.connect().await;
    tracing::info!(conn_id, "Dashboard subscribed");

    let (mut sink, mut stream) = socket.split();

    let pump = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let closing = matches!(frame, Message::Close(_));
            if sink.send(frame).await.is_err() || closing {
                break;
            }
        }
    });

    while let Some(received) = stream.next().await {
        match received {
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(conn_id, error = %e, "Dashboard socket error");
                break;
            }
        }
    }

    pump.abort();
    let connected_for = ws_manager.disconnect(conn_id).await;
    tracing::info!(
        conn_id,
        secs = connected_for.map(|d| d.num_seconds()),
        "Dashboard unsubscribed",
    );
}
