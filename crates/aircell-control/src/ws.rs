//! WebSocket handler for the live packet-transfer stream.
//!
//! Endpoint: GET /packet_transfer
//!
//! Clients receive one text line per enqueued packet:
//! `<src> -> <dst>: <n> bytes`

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::stream::StreamExt;
use futures::SinkExt;

use crate::state::AppState;

/// Axum handler — upgrades HTTP to WebSocket.
pub async fn handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: AppState, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut transfers = state.subscribe_transfers();

    tracing::debug!("packet-transfer client connected");
    if ws_tx
        .send(Message::Text("Websocket Listening".into()))
        .await
        .is_err()
    {
        return;
    }

    loop {
        tokio::select! {
            // Forward transfer lines to the client
            line = transfers.recv() => {
                match line {
                    Ok(line) => {
                        if ws_tx.send(Message::Text(line.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("packet-transfer client lagged, dropped {n} records");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }

            // Handle client messages (closes, pings)
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    tracing::debug!("packet-transfer client disconnected");
}
