//! Room management routes — live room listing and snapshot save/load.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::Serialize;
use tracing::error;

use crate::services::persistence::{self, PersistenceError};
use crate::services::room::{self, RoomSummary};
use crate::state::{AppState, JsonObject};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSavedResponse {
    pub room_id: String,
    pub path: String,
    #[serde(with = "time::serde::rfc3339")]
    pub saved_at: time::OffsetDateTime,
}

/// `GET /api/rooms` — list live rooms.
pub async fn list_rooms(State(state): State<AppState>) -> Json<Vec<RoomSummary>> {
    Json(room::list_rooms(&state).await)
}

/// `POST /api/rooms/{id}/snapshot` — write the room's state to disk.
pub async fn save_snapshot(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<SnapshotSavedResponse>, StatusCode> {
    let saved = persistence::save_room_state(&state, &room_id)
        .await
        .map_err(persistence_error_to_status)?
        .ok_or(StatusCode::NOT_FOUND)?;

    Ok(Json(SnapshotSavedResponse { room_id, path: saved.path.display().to_string(), saved_at: saved.saved_at }))
}

/// `GET /api/rooms/{id}/snapshot` — read the saved project state. Does not
/// touch the live room.
pub async fn load_snapshot(
    State(state): State<AppState>,
    Path(room_id): Path<String>,
) -> Result<Json<JsonObject>, StatusCode> {
    persistence::load_room_state(&state.config.data_dir, &room_id)
        .await
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

pub(crate) fn persistence_error_to_status(err: PersistenceError) -> StatusCode {
    match err {
        PersistenceError::InvalidRoomId(_) => StatusCode::BAD_REQUEST,
        PersistenceError::Io(_) | PersistenceError::Json(_) => {
            error!(error = %err, "snapshot save failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

#[cfg(test)]
#[path = "rooms_test.rs"]
mod tests;
