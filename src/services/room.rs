//! Room service — join/leave, presence, and shared-state updates.
//!
//! DESIGN
//! ======
//! Each public function is one handler's worth of registry work: it takes
//! the registry lock once, mutates, fans out to peers, and returns what the
//! caller should send back to its own connection. Rooms are created by the
//! first join and evicted the moment their client set becomes empty.
//!
//! LEAVE VS DISCONNECT
//! ===================
//! An explicit leave always broadcasts `user-left`, even when nobody is left
//! to receive it. A transport disconnect only broadcasts when clients remain.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::message::ServerMessage;
use crate::services::broadcast::fan_out;
use crate::state::{AppState, Binding, JsonObject, Room, Session, UserInfo};

/// How a connection is leaving its room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Departure {
    /// Client sent `leave-room`.
    Leave,
    /// Transport closed or errored.
    Disconnect,
}

/// Live room overview for the management API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomSummary {
    pub room_id: String,
    pub clients: usize,
    pub users: usize,
    pub has_state: bool,
}

// =============================================================================
// JOIN / LEAVE
// =============================================================================

/// Attach the session to `(room_id, user_id)`, creating the room if needed.
///
/// Peers receive `user-joined`. Returns the messages for the joiner:
/// `project-state` when the room has state, then `users-in-room`.
pub async fn join_room(
    state: &AppState,
    session: &mut Session,
    room_id: &str,
    user_id: &str,
    user_name: Option<&str>,
) -> Vec<ServerMessage> {
    let mut rooms = state.rooms.write().await;

    // Release a previous binding on this connection first.
    if let Some(prev) = session.binding.take() {
        if prev.room_id != room_id {
            detach(&mut rooms, &prev, session.conn_id, Departure::Leave);
        } else if prev.user_id != user_id {
            if let Some(room) = rooms.get_mut(room_id) {
                room.users.remove(&prev.user_id);
                fan_out(room, &ServerMessage::UserLeft { user_id: prev.user_id }, Some(session.conn_id));
            }
        }
    }

    let room = rooms.entry(room_id.to_owned()).or_insert_with(|| {
        info!(%room_id, "room created");
        Room::new(room_id)
    });

    let user = UserInfo::new(user_id, user_name);
    let joined = ServerMessage::UserJoined { user: user.summary() };
    room.users.insert(user_id.to_owned(), user);
    room.clients.insert(session.conn_id, session.tx.clone());
    session.binding = Some(Binding { room_id: room_id.to_owned(), user_id: user_id.to_owned() });

    fan_out(room, &joined, Some(session.conn_id));

    let mut replies = Vec::with_capacity(2);
    if let Some(project_state) = &room.project_state {
        replies.push(ServerMessage::ProjectState { state: project_state.clone() });
    }
    replies.push(ServerMessage::UsersInRoom { users: room.users.values().cloned().collect() });

    info!(%room_id, %user_id, conn_id = %session.conn_id, clients = room.clients.len(), "client joined room");
    replies
}

/// Explicit `leave-room`. Returns `false` if the session was not bound.
pub async fn leave_room(state: &AppState, session: &mut Session) -> bool {
    depart(state, session, Departure::Leave).await
}

/// Transport close. Returns `false` if the session was not bound.
pub async fn disconnect(state: &AppState, session: &mut Session) -> bool {
    depart(state, session, Departure::Disconnect).await
}

async fn depart(state: &AppState, session: &mut Session, departure: Departure) -> bool {
    let Some(binding) = session.binding.take() else {
        return false;
    };
    let mut rooms = state.rooms.write().await;
    detach(&mut rooms, &binding, session.conn_id, departure);
    true
}

/// Remove a user and connection from a room, notify, and evict if empty.
fn detach(rooms: &mut HashMap<String, Room>, binding: &Binding, conn_id: Uuid, departure: Departure) {
    let Some(room) = rooms.get_mut(&binding.room_id) else {
        return;
    };

    room.users.remove(&binding.user_id);
    room.clients.remove(&conn_id);
    let remaining = room.clients.len();
    info!(room_id = %binding.room_id, user_id = %binding.user_id, %conn_id, ?departure, remaining, "client left room");

    if departure == Departure::Leave || remaining > 0 {
        fan_out(room, &ServerMessage::UserLeft { user_id: binding.user_id.clone() }, None);
    }

    if remaining == 0 {
        rooms.remove(&binding.room_id);
        info!(room_id = %binding.room_id, "evicted room from memory");
    }
}

// =============================================================================
// CONTENT
// =============================================================================

/// Overwrite top-level keys of `target` with those of `update`. Nested
/// values are replaced wholesale, never merged.
pub fn shallow_merge(target: &mut JsonObject, update: JsonObject) {
    target.extend(update);
}

/// Merge a content update into the room's project state and relay it to
/// every other client. Returns `false` if the room does not exist.
pub async fn update_content(
    state: &AppState,
    conn_id: Uuid,
    room_id: &str,
    user_id: &str,
    content_update: JsonObject,
) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        debug!(%room_id, "content update for unknown room dropped");
        return false;
    };

    shallow_merge(room.project_state.get_or_insert_with(JsonObject::new), content_update.clone());
    room.dirty = true;

    let msg = ServerMessage::ContentUpdate { content_update, user_id: user_id.to_owned() };
    fan_out(room, &msg, Some(conn_id));
    true
}

// =============================================================================
// PRESENCE
// =============================================================================

/// Cursor fields relayed verbatim to peers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorPosition {
    pub page_id: Option<Value>,
    pub block_id: Option<Value>,
    pub position: Option<Value>,
}

/// Relay an ephemeral cursor position. The sender's current `UserInfo` is
/// looked up at send time. Returns `false` if the room does not exist.
pub async fn broadcast_cursor(
    state: &AppState,
    conn_id: Uuid,
    room_id: &str,
    user_id: &str,
    cursor: CursorPosition,
) -> bool {
    let rooms = state.rooms.read().await;
    let Some(room) = rooms.get(room_id) else {
        return false;
    };

    let msg = ServerMessage::CursorPosition {
        page_id: cursor.page_id,
        block_id: cursor.block_id,
        position: cursor.position,
        user_id: user_id.to_owned(),
        user: room.users.get(user_id).cloned(),
    };
    fan_out(room, &msg, Some(conn_id));
    true
}

/// Merge a patch into an existing member's `UserInfo` and announce it.
/// Returns `false` if the room is missing or the user is not a member.
pub async fn update_user_info(
    state: &AppState,
    conn_id: Uuid,
    room_id: &str,
    user_id: &str,
    patch: &JsonObject,
) -> bool {
    let mut rooms = state.rooms.write().await;
    let Some(room) = rooms.get_mut(room_id) else {
        return false;
    };
    let Some(user) = room.users.get_mut(user_id) else {
        return false;
    };

    user.merge(patch);
    let msg = ServerMessage::UserUpdated { user: user.clone() };
    fan_out(room, &msg, Some(conn_id));
    true
}

// =============================================================================
// QUERIES
// =============================================================================

/// Summaries of every live room, sorted by id.
pub async fn list_rooms(state: &AppState) -> Vec<RoomSummary> {
    let rooms = state.rooms.read().await;
    let mut out: Vec<RoomSummary> = rooms
        .values()
        .map(|room| RoomSummary {
            room_id: room.id.clone(),
            clients: room.clients.len(),
            users: room.users.len(),
            has_state: room.project_state.is_some(),
        })
        .collect();
    out.sort_by(|a, b| a.room_id.cmp(&b.room_id));
    out
}

#[cfg(test)]
#[path = "room_test.rs"]
mod tests;
