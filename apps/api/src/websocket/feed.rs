//! Viewer feed over WebSocket
//!
//! The first frame is always the bootstrap `FULL` event; after that the
//! relay forwards whatever its classifier emits. Frames from the viewer are
//! ignored apart from close. A failed bootstrap sends one failure frame and
//! closes.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::Response,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::error::ApiError;
use crate::state::AppState;
use crate::sync::{ViewerEvent, VIEWER_QUEUE_CAPACITY};

/// WebSocket upgrade handler for `GET /feed/:id`
pub async fn feed_handler(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

/// Serialize and send one event
async fn send_event(
    ws_sender: &mut SplitSink<WebSocket, Message>,
    event: &ViewerEvent,
) -> Result<(), axum::Error> {
    match serde_json::to_string(event) {
        Ok(json) => ws_sender.send(Message::Text(json)).await,
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize viewer event");
            Ok(())
        }
    }
}

/// Tell the viewer why it cannot follow this session, then close
async fn reject(mut ws_sender: SplitSink<WebSocket, Message>, error: ApiError) {
    error.log();

    let code = match error {
        ApiError::InvalidSessionId | ApiError::SessionNotFound(_) => close_code::POLICY,
        _ => close_code::ERROR,
    };
    if let Ok(json) = serde_json::to_string(&error.to_response_body()) {
        let _ = ws_sender.send(Message::Text(json)).await;
    }
    let _ = ws_sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: error.error_code().into(),
        })))
        .await;
}

/// Handle an established viewer connection
async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    let feed = match state.feeds.open(&session_id).await {
        Ok(feed) => feed,
        Err(e) => {
            reject(ws_sender, e).await;
            return;
        }
    };

    if send_event(&mut ws_sender, &feed.greeting).await.is_err() {
        tracing::debug!(session_id = %session_id, "Viewer left before bootstrap completed");
        return;
    }

    tracing::info!(session_id = %session_id, "Viewer connected");

    let (tx, mut rx) = mpsc::channel::<ViewerEvent>(VIEWER_QUEUE_CAPACITY);

    let relay_task = tokio::spawn(feed.relay.forward(feed.updates, tx));

    // Forward relay events to the socket
    let session_id_send = session_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if send_event(&mut ws_sender, &event).await.is_err() {
                tracing::debug!(session_id = %session_id_send, "WebSocket send failed");
                break;
            }
        }
    });

    // Watch the socket so a close cancels the relay
    let session_id_recv = session_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(Message::Close(_)) => {
                    tracing::debug!(session_id = %session_id_recv, "WebSocket close received");
                    break;
                }
                Ok(_) => {
                    tracing::trace!(session_id = %session_id_recv, "Ignoring viewer frame");
                }
                Err(e) => {
                    tracing::debug!(error = %e, session_id = %session_id_recv, "WebSocket error");
                    break;
                }
            }
        }
    });

    // Wait for either side to finish, then tear the rest down
    tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(session_id = %session_id, "Send task completed");
            recv_task.abort();
        }
        _ = &mut recv_task => {
            tracing::debug!(session_id = %session_id, "Receive task completed");
            send_task.abort();
        }
    }
    relay_task.abort();

    tracing::info!(session_id = %session_id, "Viewer disconnected");
}
