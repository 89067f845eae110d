//! Axum WebSocket handler
//!
//! This module contains the WebSocket upgrade handler for Axum and the
//! connection loop that bridges the socket and a [`SessionRuntime`].

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ConnectInfo, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use crate::core::provisioning::DeviceIdentity;
use crate::core::session::{Session, SessionEvent, SessionRuntime};
use crate::state::AppState;

use super::{
    error::{WebSocketError, WebSocketResult},
    identity::{IdentityQuery, MISSING_IDENTITY_HINT, resolve_identity},
    messages::{
        AudioParams, IncomingMessage, ListenState, MessageRoute, OutgoingMessage, ServerStatus,
        TRANSPORT,
    },
};

/// Channel buffer for outbound routes and session events
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// How long the sender may take to flush after the session closed
const SENDER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

const RESTART_ACTION: &str = "restart";

/// WebSocket voice session handler
///
/// Resolves the device identity and authenticates it before upgrading.
/// Authentication failures refuse the upgrade; a missing identity upgrades
/// only to send a hint and close.
pub async fn ws_voice_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<IdentityQuery>,
    headers: HeaderMap,
) -> Response {
    let Some(device) = resolve_identity(&headers, &query, peer) else {
        warn!(peer = %peer, "WebSocket connection without device id");
        return ws.on_upgrade(reject_missing_identity);
    };

    if let Err(e) = state.authenticator.authenticate(&device, &headers).await {
        return e.into_response();
    }

    info!(
        device_id = %device.device_id,
        client_ip = %device.client_ip,
        "WebSocket voice connection upgrade requested"
    );
    ws.on_upgrade(move |socket| handle_voice_socket(socket, state, device))
}

async fn reject_missing_identity(mut socket: WebSocket) {
    if let Err(e) = socket
        .send(Message::Text(MISSING_IDENTITY_HINT.into()))
        .await
    {
        debug!("Failed to send identity hint: {}", e);
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// Run one device connection from upgrade to teardown
async fn handle_voice_socket(socket: WebSocket, app_state: Arc<AppState>, device: DeviceIdentity) {
    let session = Session::provision(
        device,
        app_state.config.session_config(),
        app_state.provisioner.as_ref(),
    )
    .await;

    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<MessageRoute>(CHANNEL_BUFFER_SIZE);
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(CHANNEL_BUFFER_SIZE);

    let runtime = SessionRuntime::start(session, event_tx, app_state.report_sink.clone());
    let session_id = runtime.id().to_string();
    info!(session_id = %session_id, "WebSocket voice connection established");

    // Outbound: direct replies and session events share one writer
    let sender_session_id = session_id.clone();
    let sender_task = tokio::spawn(async move {
        loop {
            let route = select! {
                Some(route) = message_rx.recv() => route,
                Some(event) = event_rx.recv() => {
                    MessageRoute::from_session_event(event, &sender_session_id)
                }
                else => break,
            };

            let result = match route {
                MessageRoute::Outgoing(message) => match serde_json::to_string(&message) {
                    Ok(json_str) => sender.send(Message::Text(json_str.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing message: {}", e);
                        continue;
                    }
                },
                MessageRoute::Binary(data) => sender.send(Message::Binary(data)).await,
                MessageRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let shutdown = runtime.shutdown_token();
    loop {
        select! {
            _ = shutdown.cancelled() => {
                info!(session_id = %session_id, "Session closed, ending connection");
                break;
            }
            msg_result = receiver.next() => {
                match msg_result {
                    Some(Ok(msg)) => {
                        runtime.touch();
                        if !process_message(msg, &runtime, &message_tx, &app_state).await {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, "WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session_id, "WebSocket connection closed by client");
                        break;
                    }
                }
            }
        }
    }

    // Teardown runs once no matter how the loop ended
    runtime.close().await;
    drop(message_tx);

    let abort_sender = sender_task.abort_handle();
    if tokio::time::timeout(SENDER_DRAIN_TIMEOUT, sender_task)
        .await
        .is_err()
    {
        warn!(session_id = %session_id, "Sender did not drain in time");
        abort_sender.abort();
    }

    info!(session_id = %session_id, "WebSocket voice connection terminated");
}

/// Process one inbound frame. Returns false when the connection should end.
async fn process_message(
    msg: Message,
    runtime: &Arc<SessionRuntime>,
    message_tx: &mpsc::Sender<MessageRoute>,
    app_state: &Arc<AppState>,
) -> bool {
    match msg {
        Message::Text(text) => {
            debug!("Received text message: {} bytes", text.len());

            let result = match serde_json::from_str::<IncomingMessage>(&text) {
                Ok(incoming) => {
                    handle_incoming_message(incoming, runtime, message_tx, app_state).await
                }
                Err(e) => Err(WebSocketError::InvalidMessage(e.to_string())),
            };

            match result {
                Ok(()) => true,
                Err(WebSocketError::SessionClosing) => false,
                Err(e) => {
                    warn!(session_id = %runtime.id(), "{}", e);
                    let _ = message_tx
                        .send(MessageRoute::Outgoing(OutgoingMessage::Error {
                            message: e.to_message(),
                        }))
                        .await;
                    true
                }
            }
        }
        Message::Binary(data) => {
            runtime.send_audio(data).await;
            true
        }
        Message::Ping(_) | Message::Pong(_) => true,
        Message::Close(_) => {
            info!(session_id = %runtime.id(), "WebSocket connection closed by client");
            false
        }
    }
}

async fn handle_incoming_message(
    msg: IncomingMessage,
    runtime: &Arc<SessionRuntime>,
    message_tx: &mpsc::Sender<MessageRoute>,
    app_state: &Arc<AppState>,
) -> WebSocketResult<()> {
    match msg {
        IncomingMessage::Hello => {
            let hello = OutgoingMessage::Hello {
                session_id: runtime.id().to_string(),
                transport: TRANSPORT,
                audio_params: AudioParams::for_format(app_state.config.audio_format),
            };
            let _ = message_tx.send(MessageRoute::Outgoing(hello)).await;
        }
        IncomingMessage::Listen { state, text } => match (state, text) {
            (ListenState::Detect, Some(text)) if !text.trim().is_empty() => {
                if !runtime.submit_turn(text.trim().to_string()) {
                    return Err(WebSocketError::SessionClosing);
                }
            }
            (state, _) => debug!(session_id = %runtime.id(), "Listen state {:?}", state),
        },
        IncomingMessage::Abort => runtime.abort(),
        IncomingMessage::Server { action } => {
            if action != RESTART_ACTION {
                return Err(WebSocketError::UnsupportedAction(action));
            }
            let ack = match app_state.restart.schedule() {
                Ok(()) => {
                    info!(session_id = %runtime.id(), "Server restart scheduled");
                    OutgoingMessage::server_ack(
                        ServerStatus::Success,
                        "Restart scheduled",
                        RESTART_ACTION,
                    )
                }
                Err(e) => {
                    error!(session_id = %runtime.id(), "Restart failed: {}", e);
                    OutgoingMessage::server_ack(ServerStatus::Error, e.to_string(), RESTART_ACTION)
                }
            };
            let _ = message_tx.send(MessageRoute::Outgoing(ack)).await;
        }
    }
    Ok(())
}
