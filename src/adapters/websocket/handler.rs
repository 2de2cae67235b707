//! WebSocket upgrade handler for the live progress channel.
//!
//! Connection lifecycle:
//! 1. Upgrade to WebSocket
//! 2. Subscribe to the broadcaster, then send today's snapshot
//! 3. Forward every published snapshot until either side closes

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::application::handlers::revenue::ProgressQueryService;

use super::{broadcaster::LiveBroadcaster, messages::LiveMessage};

/// State required for the live channel.
#[derive(Clone)]
pub struct LiveState {
    pub broadcaster: Arc<LiveBroadcaster>,
    pub progress: Arc<ProgressQueryService>,
}

/// Route: `GET /revenue/live`
///
/// Mounted inside any router whose state yields a [`LiveState`] via `FromRef`.
pub async fn live_progress_ws(ws: WebSocketUpgrade, State(state): State<LiveState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: LiveState) {
    let (mut sender, mut receiver) = socket.split();

    // Subscribe before reading the snapshot so no update falls in between.
    let mut updates = state.broadcaster.subscribe();

    match state.progress.get_progress(None).await {
        Ok(snapshot) => {
            if send_message(&mut sender, &LiveMessage::progress(&snapshot))
                .await
                .is_err()
            {
                return;
            }
        }
        Err(e) => warn!(error = %e, "Failed to load initial progress snapshot"),
    }

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(snapshot) => {
                    if let Err(e) = send_message(&mut sender, &LiveMessage::progress(&snapshot)).await {
                        debug!("Send error, closing live connection: {}", e);
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "Live observer lagged, dropped oldest updates");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => {
                    debug!("Live observer disconnected");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Receive error: {}", e);
                    break;
                }
            },
        }
    }
}

async fn send_message(
    sender: &mut SplitSink<WebSocket, Message>,
    msg: &LiveMessage,
) -> Result<(), axum::Error> {
    let json = serde_json::to_string(msg).map_err(axum::Error::new)?;
    sender.send(Message::Text(json)).await
}
