//! WebSocket push channel.
//!
//! Each accepted socket becomes one broadcaster session. The socket is split
//! into a writer task draining the session's outbound queue as JSON text
//! frames and a reader loop that serves pull requests until the client goes
//! away. Teardown always unregisters the session, so its push timer dies
//! with the connection.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, instrument, warn};

use crate::snapshot::{ClientRequest, PushMessage};
use crate::state::SharedState;

/// Outbound queue depth per session. Deep enough to absorb a broadcast burst
/// without blocking the event pump.
const SESSION_QUEUE_DEPTH: usize = 32;

/// Handler for the /ws endpoint.
#[instrument(skip(state, ws))]
pub async fn stream_handler(
    State(state): State<SharedState>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_session(state, socket))
}

async fn serve_session(state: SharedState, socket: WebSocket) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<PushMessage>(SESSION_QUEUE_DEPTH);
    let id = state.broadcaster.register(tx).await;

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let frame = match serde_json::to_string(&message) {
                Ok(json) => Message::Text(json.into()),
                Err(e) => {
                    warn!("failed to encode push message: {e}");
                    continue;
                }
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientRequest>(&text) {
                Ok(ClientRequest::RequestProcesses) => {
                    debug!(session = id, "process pull requested");
                    state.broadcaster.request_processes(id).await;
                }
                Err(e) => debug!(session = id, "ignoring unparseable client frame: {e}"),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.broadcaster.unregister(id).await;
    writer.abort();
    debug!(session = id, "transport closed");
}
