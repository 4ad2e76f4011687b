use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::broker::{BrokerError, ConnectionId};
use crate::connection_manager::{ConnectionHandle, DeliveryError};
use crate::metrics::{
    SignalMetrics, WsMessageMetrics, WS_CONNECTIONS_CLOSED, WS_CONNECTIONS_OPENED,
    WS_CONNECTION_DURATION,
};
use crate::server::AppState;

use super::message::{ClientMessage, ServerMessage};
use super::notify::{notify_closed, notify_paired};

const CHANNEL_BUFFER_SIZE: usize = 32;

/// Room for the JSON envelope around a signal payload
const FRAME_OVERHEAD_BYTES: usize = 1024;

/// WebSocket upgrade handler
#[tracing::instrument(name = "ws.upgrade", skip(ws, state))]
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let max_frame = state.settings.broker.signal_max_bytes + FRAME_OVERHEAD_BYTES;
    ws.max_message_size(max_frame)
        .on_upgrade(move |socket| handle_socket(socket, state))
        .into_response()
}

/// Handle an established WebSocket connection
#[tracing::instrument(name = "ws.connection", skip(socket, state))]
async fn handle_socket(socket: WebSocket, state: AppState) {
    let connection_start = std::time::Instant::now();

    // Create channel for sending messages to this connection
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(CHANNEL_BUFFER_SIZE);

    // Register connection with limit checking
    let handle = match state.connection_manager.register(tx) {
        Ok(h) => h,
        Err(e) => {
            tracing::warn!(error = %e, "Connection rejected");
            let (mut ws_sender, _) = socket.split();
            let error_msg = ServerMessage::error("CONNECTION_LIMIT", e.to_string());
            if let Ok(json) = serde_json::to_string(&error_msg) {
                let _ = ws_sender.send(Message::Text(json.into())).await;
            }
            let _ = ws_sender.close().await;
            return;
        }
    };
    let connection_id = handle.id;

    WS_CONNECTIONS_OPENED.inc();
    tracing::info!(connection_id = %connection_id, "WebSocket connection established");

    // Tell the client the id it must quote in HTTP pairing requests
    let _ = handle.send(ServerMessage::Welcome { connection_id }).await;

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Task for sending messages from channel to WebSocket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(t) => t,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to serialize message");
                    continue;
                }
            };

            if ws_sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Task for receiving messages from WebSocket
    let state_clone = state.clone();
    let handle_clone = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = ws_receiver.next().await {
            match result {
                Ok(msg) => {
                    if !process_message(msg, &state_clone, &handle_clone) {
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "WebSocket receive error");
                    break;
                }
            }
        }
    });

    let recv_finished = tokio::select! {
        _ = &mut send_task => {
            tracing::debug!(connection_id = %connection_id, "Send task completed");
            false
        }
        _ = &mut recv_task => {
            tracing::debug!(connection_id = %connection_id, "Receive task completed");
            true
        }
        _ = handle.close_requested() => {
            tracing::debug!(connection_id = %connection_id, "Close requested");
            false
        }
    };

    // No client message may be processed once teardown starts
    if !recv_finished {
        recv_task.abort();
        let _ = recv_task.await;
    }

    // Unregister first so HTTP requests racing this teardown see the
    // connection as gone before its session is released.
    state.connection_manager.unregister(connection_id);
    release_on_disconnect(&state, connection_id);

    // The send task ends, closing the socket, once the last sender is dropped
    drop(handle);

    WS_CONNECTIONS_CLOSED.inc();
    let duration = connection_start.elapsed().as_secs_f64();
    WS_CONNECTION_DURATION.observe(duration);

    tracing::info!(
        connection_id = %connection_id,
        duration_secs = duration,
        "WebSocket connection closed"
    );
}

/// Disconnect path: release the connection's session and tell the peer
fn release_on_disconnect(state: &AppState, connection_id: ConnectionId) {
    if let Some(closed) = state.broker.on_disconnect(connection_id) {
        notify_closed(&state.connection_manager, &closed, Some(connection_id));
    }
}

/// Queue a reply for this connection. A client that stops reading loses it.
fn reply(handle: &ConnectionHandle, message: ServerMessage) {
    if let Err(e) = handle.try_send(message) {
        WsMessageMetrics::record_dropped(e.as_str());
        tracing::debug!(connection_id = %handle.id, reason = %e, "Reply dropped");
    }
}

/// Process a received WebSocket message
/// Returns false if the connection should be closed
fn process_message(msg: Message, state: &AppState, handle: &Arc<ConnectionHandle>) -> bool {
    match msg {
        Message::Text(text) => {
            handle.update_activity();

            let client_msg: ClientMessage = match serde_json::from_str(&text) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse client message");
                    reply(handle, ServerMessage::error("INVALID_MESSAGE", e.to_string()));
                    return true;
                }
            };

            handle_client_message(client_msg, state, handle);
            true
        }
        Message::Binary(_) => {
            reply(
                handle,
                ServerMessage::error("UNSUPPORTED_FORMAT", "Binary messages are not supported"),
            );
            true
        }
        Message::Ping(_) | Message::Pong(_) => {
            // Axum answers pings itself; only record liveness
            handle.update_activity();
            true
        }
        Message::Close(_) => {
            tracing::debug!(connection_id = %handle.id, "Received close frame");
            false
        }
    }
}

/// Handle a parsed client message
#[tracing::instrument(
    name = "ws.message",
    skip(msg, state, handle),
    fields(connection_id = %handle.id, message_type = msg.kind())
)]
fn handle_client_message(msg: ClientMessage, state: &AppState, handle: &ConnectionHandle) {
    match msg {
        ClientMessage::Register { vcode } => {
            WsMessageMetrics::record_register();
            handle_register(&vcode, state, handle);
        }
        ClientMessage::Join { vcode } => {
            WsMessageMetrics::record_join();
            handle_join(&vcode, state, handle);
        }
        ClientMessage::Release => {
            WsMessageMetrics::record_release();
            handle_release(state, handle);
        }
        ClientMessage::Signal { data } => {
            WsMessageMetrics::record_signal();
            handle_signal(data, state, handle);
        }
        ClientMessage::Ping => {
            WsMessageMetrics::record_ping();
            reply(handle, ServerMessage::Pong);
        }
    }
}

fn handle_register(raw: &str, state: &AppState, handle: &ConnectionHandle) {
    let result = state
        .broker
        .parse_code(raw)
        .and_then(|vcode| state.broker.register_sender(vcode, handle.id));

    let message = match result {
        Ok(session) => ServerMessage::Registered {
            vcode: session.vcode.to_string(),
            expires_at: state.broker.expires_at(&session),
        },
        Err(e) => ServerMessage::from(&e),
    };
    reply(handle, message);
}

fn handle_join(raw: &str, state: &AppState, handle: &ConnectionHandle) {
    let result = state
        .broker
        .parse_code(raw)
        .and_then(|vcode| state.broker.join_receiver(&vcode, handle.id));

    match result {
        Ok(session) => notify_paired(&state.connection_manager, &session),
        Err(e) => reply(handle, ServerMessage::from(&e)),
    }
}

fn handle_release(state: &AppState, handle: &ConnectionHandle) {
    let result = state
        .broker
        .resolve(handle.id)
        .and_then(|binding| state.broker.release(&binding.vcode, handle.id));

    match result {
        // The releaser gets the same session_closed as its peer, as confirmation
        Ok(closed) => notify_closed(&state.connection_manager, &closed, None),
        Err(e) => reply(handle, ServerMessage::from(&e)),
    }
}

/// Forward an opaque signal to the paired peer
fn handle_signal(data: serde_json::Value, state: &AppState, handle: &ConnectionHandle) {
    let max_bytes = state.settings.broker.signal_max_bytes;
    let size = serde_json::to_vec(&data).map(|v| v.len()).unwrap_or(usize::MAX);
    if size > max_bytes {
        SignalMetrics::record_dropped("too_large");
        reply(
            handle,
            ServerMessage::error(
                "SIGNAL_TOO_LARGE",
                format!("Signal payload exceeds {} bytes", max_bytes),
            ),
        );
        return;
    }

    let peer = match state.broker.peer_of(handle.id) {
        Ok(Some(peer)) => peer,
        Ok(None) => {
            SignalMetrics::record_dropped("not_paired");
            reply(
                handle,
                ServerMessage::error("NOT_PAIRED", "No receiver has joined this session yet"),
            );
            return;
        }
        Err(e) => {
            let reason = match e {
                BrokerError::NotBound(_) => "not_bound",
                _ => "no_session",
            };
            SignalMetrics::record_dropped(reason);
            reply(handle, ServerMessage::from(&e));
            return;
        }
    };

    match state
        .connection_manager
        .send_to(peer, ServerMessage::Signal { data })
    {
        Ok(()) => SignalMetrics::record_relayed(),
        Err(e) => {
            let reason = match e {
                DeliveryError::Backlogged => "peer_backlogged",
                DeliveryError::NotConnected | DeliveryError::Closed => "peer_gone",
            };
            SignalMetrics::record_dropped(reason);
            tracing::debug!(
                connection_id = %handle.id,
                peer_id = %peer,
                reason = reason,
                "Signal dropped"
            );
        }
    }
}
