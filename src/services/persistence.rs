//! Persistence service — on-demand room snapshots as JSON files.
//!
//! DESIGN
//! ======
//! Snapshots live at `<data_dir>/collaboration/<room_id>.json` and hold
//! `{roomId, projectState, savedAt, activeUsers}`. They are management-plane
//! only: the live message path never saves or loads, and loading never
//! populates a live room.
//!
//! Saves of one room are serialized by a per-room lock held for the whole
//! save. The room is copied out under the registry lock, the lock is
//! released, then the file is written with async I/O to a uniquely named temp
//! path and renamed into place. A failed write removes its temp file. An
//! optional background task saves dirty rooms on an interval.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::state::{AppState, JsonObject, UserInfo};

/// Subdirectory of the data dir holding room snapshots.
pub const SNAPSHOT_SUBDIR: &str = "collaboration";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("invalid room id for snapshot: {0:?}")]
    InvalidRoomId(String),
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Point-in-time export of one room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub room_id: String,
    pub project_state: JsonObject,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: OffsetDateTime,
    pub active_users: Vec<UserInfo>,
}

/// Where a save landed.
#[derive(Debug, Clone, PartialEq)]
pub struct SavedSnapshot {
    pub path: PathBuf,
    pub saved_at: OffsetDateTime,
}

/// Only the field `load_room_state` returns; the rest of the file is not
/// required to parse.
#[derive(Deserialize)]
struct StoredProjectState {
    #[serde(rename = "projectState")]
    project_state: Option<JsonObject>,
}

// =============================================================================
// PATHS
// =============================================================================

/// Snapshot file for `room_id`.
///
/// # Errors
///
/// Returns `InvalidRoomId` if the id is empty, a dot segment, or contains a
/// path separator or NUL.
pub fn snapshot_path(data_dir: &Path, room_id: &str) -> Result<PathBuf, PersistenceError> {
    let invalid = room_id.is_empty()
        || room_id == "."
        || room_id == ".."
        || room_id.contains(['/', '\\', '\0']);
    if invalid {
        return Err(PersistenceError::InvalidRoomId(room_id.to_owned()));
    }
    Ok(data_dir.join(SNAPSHOT_SUBDIR).join(format!("{room_id}.json")))
}

// =============================================================================
// SAVE / LOAD
// =============================================================================

/// Save the room's shared state. Returns `Ok(None)` if the room is not live
/// or has never received a content update.
///
/// # Errors
///
/// Returns an error for an invalid room id or if the file cannot be written.
/// The room stays dirty when the write fails.
pub async fn save_room_state(state: &AppState, room_id: &str) -> Result<Option<SavedSnapshot>, PersistenceError> {
    let path = snapshot_path(&state.config.data_dir, room_id)?;
    let save_lock = state.snapshot_lock(room_id).await;
    let _saving = save_lock.lock().await;

    let snapshot = {
        let mut rooms = state.rooms.write().await;
        let Some(room) = rooms.get_mut(room_id) else {
            return Ok(None);
        };
        let Some(project_state) = room.project_state.clone() else {
            return Ok(None);
        };
        room.dirty = false;
        Snapshot {
            room_id: room_id.to_owned(),
            project_state,
            saved_at: OffsetDateTime::now_utc(),
            active_users: room.users.values().cloned().collect(),
        }
    };

    if let Err(e) = write_snapshot(&path, &snapshot).await {
        let mut rooms = state.rooms.write().await;
        if let Some(room) = rooms.get_mut(room_id) {
            room.dirty = true;
        }
        return Err(e);
    }

    info!(%room_id, path = %path.display(), "room snapshot saved");
    Ok(Some(SavedSnapshot { path, saved_at: snapshot.saved_at }))
}

async fn write_snapshot(path: &Path, snapshot: &Snapshot) -> Result<(), PersistenceError> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    if let Some(dir) = path.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    let tmp = path.with_extension(format!("json.{}.tmp", Uuid::new_v4()));
    let written = match tokio::fs::write(&tmp, &bytes).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        tokio::fs::remove_file(&tmp).await.ok();
        return Err(e.into());
    }
    Ok(())
}

/// Read the saved `projectState` for `room_id`. Returns `None` when the file
/// is absent, unreadable, or does not parse.
pub async fn load_room_state(data_dir: &Path, room_id: &str) -> Option<JsonObject> {
    let path = match snapshot_path(data_dir, room_id) {
        Ok(path) => path,
        Err(e) => {
            warn!(error = %e, "snapshot load rejected");
            return None;
        }
    };

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "snapshot read failed");
            return None;
        }
    };

    match serde_json::from_slice::<StoredProjectState>(&bytes) {
        Ok(stored) => stored.project_state,
        Err(e) => {
            warn!(error = %e, path = %path.display(), "snapshot parse failed");
            None
        }
    }
}

// =============================================================================
// BACKGROUND TASK
// =============================================================================

/// Spawn a task that saves every dirty room each `interval`. Returns a
/// handle for shutdown.
pub fn spawn_snapshot_task(state: AppState, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            save_dirty_rooms(&state).await;
        }
    })
}

/// Save every room whose state changed since its last snapshot.
/// Returns the number of snapshots written.
pub async fn save_dirty_rooms(state: &AppState) -> usize {
    let dirty: Vec<String> = {
        let rooms = state.rooms.read().await;
        rooms
            .values()
            .filter(|room| room.dirty)
            .map(|room| room.id.clone())
            .collect()
    };

    let mut saved = 0;
    for room_id in dirty {
        match save_room_state(state, &room_id).await {
            Ok(Some(_)) => saved += 1,
            Ok(None) => {}
            Err(e) => error!(error = %e, %room_id, "periodic snapshot failed"),
        }
    }
    saved
}

#[cfg(test)]
#[path = "persistence_test.rs"]
mod tests;
