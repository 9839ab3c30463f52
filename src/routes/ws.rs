//! WebSocket handler — one task per connection.
//!
//! DESIGN
//! ======
//! On upgrade, generates a connection id and a bounded outbound channel,
//! then enters a `select!` loop:
//! - Incoming client text frames → decode + dispatch by `type`
//! - Broadcast messages from room peers → forward to client
//!
//! Handlers go through the room service, which mutates the registry and
//! fans out to peers under one lock. Handlers return only the messages
//! addressed to the sender; this layer writes them to the socket.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → unbound `Session`
//! 2. `join-room` binds the session to `(roomId, userId)`
//! 3. `leave-room` unbinds; the connection may join again
//! 4. Close or transport error → disconnect cleanup, exactly once

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::message::{self, ClientMessage, IDS_REQUIRED, INVALID_MESSAGE_FORMAT, Inbound, ServerMessage};
use crate::services::room::{self, CursorPosition};
use crate::state::{AppState, JsonObject, Session};

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let conn_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcasts from room peers.
    let (client_tx, mut client_rx) = mpsc::channel::<ServerMessage>(state.config.client_channel_capacity);
    let mut session = Session::new(conn_id, client_tx);

    info!(%conn_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let msg = match msg {
                    Ok(msg) => msg,
                    Err(e) => {
                        warn!(%conn_id, error = %e, "ws: transport error");
                        break;
                    }
                };
                match msg {
                    Message::Text(text) => {
                        let replies = process_inbound_text(&state, &mut session, &text).await;
                        for reply in &replies {
                            let _ = send_message(&mut socket, reply).await;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            Some(outbound) = client_rx.recv() => {
                if send_message(&mut socket, &outbound).await.is_err() {
                    break;
                }
            }
        }
    }

    room::disconnect(&state, &mut session).await;
    info!(%conn_id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Decode and process one inbound text frame and return messages for the
/// sender. Peers are reached through the room service.
///
/// Transport concerns stay in `run_ws`, so tests can drive dispatch with a
/// bare `Session`.
async fn process_inbound_text(state: &AppState, session: &mut Session, text: &str) -> Vec<ServerMessage> {
    let inbound = match message::decode(text) {
        Ok(inbound) => inbound,
        Err(e) => {
            warn!(conn_id = %session.conn_id, error = %e, "ws: invalid inbound frame");
            return vec![ServerMessage::error(INVALID_MESSAGE_FORMAT)];
        }
    };

    match inbound {
        Inbound::Message(msg) => dispatch(state, session, msg).await,
        Inbound::Unknown(kind) => {
            warn!(conn_id = %session.conn_id, kind = %kind, "ws: unknown message type");
            Vec::new()
        }
        Inbound::Dropped(kind) => {
            debug!(conn_id = %session.conn_id, kind = %kind, "ws: malformed best-effort message dropped");
            Vec::new()
        }
    }
}

async fn dispatch(state: &AppState, session: &mut Session, msg: ClientMessage) -> Vec<ServerMessage> {
    match msg {
        ClientMessage::JoinRoom { room_id, user_id, user_name } => {
            handle_join(state, session, room_id.as_deref(), user_id.as_deref(), user_name.as_deref()).await
        }
        ClientMessage::LeaveRoom => handle_leave(state, session).await,
        ClientMessage::UpdateContent { room_id, user_id, content_update } => {
            handle_update_content(state, session, room_id.as_deref(), user_id.as_deref(), content_update).await
        }
        ClientMessage::CursorPosition { room_id, user_id, page_id, block_id, position } => {
            let cursor = CursorPosition { page_id, block_id, position };
            handle_cursor(state, session, room_id.as_deref(), user_id.as_deref(), cursor).await
        }
        ClientMessage::UserInfo { room_id, user_id, user_info } => {
            handle_user_info(state, session, room_id.as_deref(), user_id.as_deref(), &user_info).await
        }
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

async fn handle_join(
    state: &AppState,
    session: &mut Session,
    room_id: Option<&str>,
    user_id: Option<&str>,
    user_name: Option<&str>,
) -> Vec<ServerMessage> {
    let (Some(room_id), Some(user_id)) = (message::required(room_id), message::required(user_id)) else {
        return vec![ServerMessage::error(IDS_REQUIRED)];
    };
    room::join_room(state, session, room_id, user_id, user_name).await
}

async fn handle_leave(state: &AppState, session: &mut Session) -> Vec<ServerMessage> {
    if !room::leave_room(state, session).await {
        warn!(conn_id = %session.conn_id, "ws: leave-room on unbound connection");
    }
    Vec::new()
}

async fn handle_update_content(
    state: &AppState,
    session: &Session,
    room_id: Option<&str>,
    user_id: Option<&str>,
    content_update: JsonObject,
) -> Vec<ServerMessage> {
    let (Some(room_id), Some(user_id)) = (message::required(room_id), message::required(user_id)) else {
        return vec![ServerMessage::error(IDS_REQUIRED)];
    };
    room::update_content(state, session.conn_id, room_id, user_id, content_update).await;
    Vec::new()
}

/// Best-effort: missing ids or an unknown room are dropped without a reply.
async fn handle_cursor(
    state: &AppState,
    session: &Session,
    room_id: Option<&str>,
    user_id: Option<&str>,
    cursor: CursorPosition,
) -> Vec<ServerMessage> {
    if let (Some(room_id), Some(user_id)) = (message::required(room_id), message::required(user_id)) {
        room::broadcast_cursor(state, session.conn_id, room_id, user_id, cursor).await;
    }
    Vec::new()
}

/// Best-effort: only existing members can be updated, silently.
async fn handle_user_info(
    state: &AppState,
    session: &Session,
    room_id: Option<&str>,
    user_id: Option<&str>,
    user_info: &JsonObject,
) -> Vec<ServerMessage> {
    if let (Some(room_id), Some(user_id)) = (message::required(room_id), message::required(user_id)) {
        if !room::update_user_info(state, session.conn_id, room_id, user_id, user_info).await {
            debug!(conn_id = %session.conn_id, %room_id, %user_id, "ws: user-info for non-member dropped");
        }
    }
    Vec::new()
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_message(socket: &mut WebSocket, msg: &ServerMessage) -> Result<(), ()> {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, kind = msg.kind(), "ws: failed to serialize message");
            return Err(());
        }
    };
    if let ServerMessage::Error { message } = msg {
        warn!(reply = %message, "ws: send error reply");
    }
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
