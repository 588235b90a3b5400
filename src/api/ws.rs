// =============================================================================
// WebSocket Handler — push feed of reputation deltas
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate snapshot of every channel's current reputation.
//   2. A `Delta` every 500 ms whenever the engine's `state_version` has
//      changed since the last push, carrying the current channel
//      reputations plus the most recent terminal events (bounded ring
//      buffer, §3) — a client that was briefly disconnected can always
//      re-derive a consistent view from the next snapshot rather than
//      relying on having seen every delta in between.
//
// Mirrors the teacher's push/recv `tokio::select!` loop shape; there is no
// authenticated control-plane here (this surface is read-only), so the
// token-gated upgrade the teacher used for its trading dashboard is dropped.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::state::{ChannelSummary, EngineState};
use crate::outcome::OutcomeEvent;

#[derive(Serialize)]
struct Snapshot {
    kind: &'static str,
    state_version: u64,
    channels: Vec<ChannelSummary>,
}

#[derive(Serialize)]
struct Delta {
    kind: &'static str,
    state_version: u64,
    terminal_events: Vec<OutcomeEvent>,
    channels: Vec<ChannelSummary>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<EngineState>>,
) -> impl IntoResponse {
    info!("websocket connection accepted");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

async fn handle_ws_connection(socket: WebSocket, state: Arc<EngineState>) {
    let (mut sender, mut receiver) = socket.split();

    if let Err(e) = send_full_snapshot(&mut sender, &state).await {
        warn!(error = %e, "failed to send initial websocket snapshot");
        return;
    }
    let mut last_sent_version = state.current_version();

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            _ = push_interval.tick() => {
                let current_version = state.current_version();
                if current_version != last_sent_version {
                    match send_delta(&mut sender, &state, current_version).await {
                        Ok(()) => last_sent_version = current_version,
                        Err(e) => {
                            debug!(error = %e, "websocket send failed, disconnecting");
                            break;
                        }
                    }
                }
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("websocket connection closed");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "websocket receive error, disconnecting");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn send_full_snapshot<S>(sender: &mut S, state: &Arc<EngineState>) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let snapshot = Snapshot {
        kind: "snapshot",
        state_version: state.current_version(),
        channels: state.build_channels_view(),
    };
    send_json(sender, &snapshot).await
}

async fn send_delta<S>(sender: &mut S, state: &Arc<EngineState>, version: u64) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    let delta = Delta {
        kind: "delta",
        state_version: version,
        terminal_events: state.recent_terminal_events(),
        channels: state.build_channels_view(),
    };
    send_json(sender, &delta).await
}

async fn send_json<S, T: Serialize>(sender: &mut S, value: &T) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
{
    match serde_json::to_string(value) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(e) => {
            warn!(error = %e, "failed to serialize websocket payload");
            Ok(())
        }
    }
}
