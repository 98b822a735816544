//! WebSocket transport for reconstruction sessions.
//!
//! Each upgraded socket is split into a reader task and a writer task around
//! one [`Session`]. The session runs on the connection task and processes
//! frames strictly in order; the writer drains its outbound channel to the
//! socket. When the client goes away the reader flips a watch flag, the
//! writer exits and drops the channel receiver, and any pending session
//! await (gateway invocation or chunk pacing) fails fast with
//! `Disconnected`.

use aether_core::{ServerMessage, Session, SessionError};
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

use crate::api::ApiState;

/// Outbound messages buffered per connection before the session waits.
const OUTBOUND_BUFFER: usize = 32;

/// Inbound text frames buffered while the session is busy.
const INBOUND_BUFFER: usize = 64;

/// WebSocket handler endpoint.
///
/// # Endpoint
///
/// `GET /ws/reconstruct` with `Upgrade: websocket` header
#[allow(clippy::unused_async)] // Required for axum handler
pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<ApiState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: ApiState) {
    let (mut sender, mut receiver) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<ServerMessage>(OUTBOUND_BUFFER);
    let (in_tx, mut in_rx) = mpsc::channel::<String>(INBOUND_BUFFER);
    let (closed_tx, mut closed_rx) = watch::channel(false);

    let mut session = Session::new(
        state.sessions.clone(),
        state.gateway.clone(),
        state.session_config.clone(),
        out_tx,
    );
    let session_id = session.id();
    info!(%session_id, "WebSocket connection established");

    let reader = tokio::spawn(async move {
        while let Some(frame) = receiver.next().await {
            match frame {
                Ok(Message::Text(text)) => {
                    if in_tx.send(text.as_str().to_owned()).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => {
                    debug!("Client sent close message");
                    break;
                }
                Ok(_) => {
                    // Binary, Ping and Pong frames carry no protocol messages
                }
                Err(e) => {
                    debug!("WebSocket receive error: {e}");
                    break;
                }
            }
        }
        let _ = closed_tx.send(true);
    });

    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                outbound = out_rx.recv() => {
                    let Some(message) = outbound else { break };
                    let json = match serde_json::to_string(&message) {
                        Ok(j) => j,
                        Err(e) => {
                            error!("Failed to serialize message: {e}");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        debug!("Failed to send message, client disconnected");
                        break;
                    }
                }
                _ = closed_rx.changed() => break,
            }
        }
        // Dropping `out_rx` here is what tells the session the client is gone.
        drop(out_rx);
        let _ = sender.close().await;
    });

    while let Some(text) = in_rx.recv().await {
        match session.handle_text(&text).await {
            Ok(()) => {}
            Err(SessionError::Disconnected) => break,
            Err(e) => error!(%session_id, "Unexpected session error: {e}"),
        }
    }

    session.close();
    drop(session);
    reader.abort();
    let _ = writer.await;
    info!(%session_id, "WebSocket connection closed");
}
