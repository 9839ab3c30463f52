//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It owns the room registry: room id -> live room with its connected
//! clients, presence directory, and shared project state. A room lives in
//! the registry only while at least one connection is attached to it.
//!
//! Every registry mutation happens inside one handler call holding the
//! write lock, including the fan-out to peers, so per-room ordering equals
//! the order in which handlers acquire the lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::message::ServerMessage;
use crate::services::color;

/// Open-ended JSON object. Used for project state, content updates and
/// user-info patches.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Display name used when a joiner does not send one.
pub const ANONYMOUS: &str = "Anonymous";

// =============================================================================
// USER INFO
// =============================================================================

/// Presence record for one user in one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(with = "time::serde::rfc3339")]
    pub connected_at: OffsetDateTime,
    /// Client-supplied attributes merged in by `user-info` messages.
    #[serde(flatten)]
    pub extra: JsonObject,
}

/// The subset of `UserInfo` announced in `user-joined`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub name: String,
    pub color: String,
}

impl UserInfo {
    /// Fresh record for a (re)join. Color is derived from the id.
    #[must_use]
    pub fn new(id: &str, name: Option<&str>) -> Self {
        Self {
            id: id.to_owned(),
            name: name.filter(|n| !n.is_empty()).unwrap_or(ANONYMOUS).to_owned(),
            color: color::color_for(id).to_owned(),
            connected_at: OffsetDateTime::now_utc(),
            extra: JsonObject::new(),
        }
    }

    #[must_use]
    pub fn summary(&self) -> UserSummary {
        UserSummary { id: self.id.clone(), name: self.name.clone(), color: self.color.clone() }
    }

    /// Shallow-merge a client patch into this record.
    ///
    /// `name` and `color` replace the typed fields when they are strings.
    /// `id` and `connectedAt` are owned by the server and never overwritten.
    /// Any other key replaces the extra attribute of the same name.
    pub fn merge(&mut self, patch: &JsonObject) {
        for (key, value) in patch {
            match key.as_str() {
                "id" | "connectedAt" => {}
                "name" => {
                    if let Some(name) = value.as_str() {
                        name.clone_into(&mut self.name);
                    }
                }
                "color" => {
                    if let Some(color) = value.as_str() {
                        color.clone_into(&mut self.color);
                    }
                }
                _ => {
                    self.extra.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

// =============================================================================
// ROOM
// =============================================================================

/// One collaboration room. Kept in memory while any client is attached.
pub struct Room {
    pub id: String,
    /// Connected clients: `conn_id` -> sender for outgoing messages.
    pub clients: HashMap<Uuid, mpsc::Sender<ServerMessage>>,
    /// Presence directory keyed by user id.
    pub users: HashMap<String, UserInfo>,
    /// Latest shared document. `None` until the first content update.
    pub project_state: Option<JsonObject>,
    /// Project state changed since the last snapshot.
    pub dirty: bool,
}

impl Room {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), clients: HashMap::new(), users: HashMap::new(), project_state: None, dirty: false }
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// The `(roomId, userId)` pair a connection is attached to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    pub room_id: String,
    pub user_id: String,
}

/// Per-connection record owned by the websocket task and passed into every
/// dispatch call.
pub struct Session {
    pub conn_id: Uuid,
    /// This connection's own outbound channel; registered in a room on join.
    pub tx: mpsc::Sender<ServerMessage>,
    pub binding: Option<Binding>,
}

impl Session {
    #[must_use]
    pub fn new(conn_id: Uuid, tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { conn_id, tx, binding: None }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub rooms: Arc<RwLock<HashMap<String, Room>>>,
    /// One lock per room id; snapshot saves of the same room run one at a time.
    pub snapshot_locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            rooms: Arc::new(RwLock::new(HashMap::new())),
            snapshot_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The save lock for `room_id`, created on first use.
    pub async fn snapshot_lock(&self, room_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.snapshot_locks.lock().await;
        Arc::clone(locks.entry(room_id.to_owned()).or_default())
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
