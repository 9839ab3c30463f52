//! Wire messages for the room protocol.
//!
//! ARCHITECTURE
//! ============
//! Every frame is a UTF-8 JSON object discriminated by its `type` field.
//! Inbound frames decode into `ClientMessage`, outbound frames are built as
//! `ServerMessage`. Both are tagged unions with one strict payload shape per
//! variant.
//!
//! DECODING
//! ========
//! - Not JSON, not an object, or a known type with a malformed payload:
//!   `MessageError`, which the connection reports as "Invalid message format".
//! - An object with a missing or unrecognised `type`: `Inbound::Unknown`,
//!   which is logged and otherwise ignored.
//! - A malformed `cursor-position` or `user-info`: `Inbound::Dropped`. These
//!   are best-effort events and never get an error reply.
//! - A `null` payload object (`contentUpdate`, `userInfo`) reads as `{}`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::state::{JsonObject, UserInfo, UserSummary};

/// Error text sent when a frame cannot be decoded.
pub const INVALID_MESSAGE_FORMAT: &str = "Invalid message format";

/// Error text sent when join or update-content lacks its ids.
pub const IDS_REQUIRED: &str = "roomId and userId are required";

// =============================================================================
// INBOUND
// =============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    JoinRoom {
        room_id: Option<String>,
        user_id: Option<String>,
        user_name: Option<String>,
    },
    /// Uses the connection's bound room and user; payload fields are ignored.
    LeaveRoom,
    UpdateContent {
        room_id: Option<String>,
        user_id: Option<String>,
        #[serde(default, deserialize_with = "null_as_empty")]
        content_update: JsonObject,
    },
    CursorPosition {
        room_id: Option<String>,
        user_id: Option<String>,
        page_id: Option<Value>,
        block_id: Option<Value>,
        position: Option<Value>,
    },
    UserInfo {
        room_id: Option<String>,
        user_id: Option<String>,
        #[serde(default, deserialize_with = "null_as_empty")]
        user_info: JsonObject,
    },
}

impl ClientMessage {
    /// Every `type` tag this server understands.
    pub const TYPES: [&'static str; 5] = ["join-room", "leave-room", "update-content", "cursor-position", "user-info"];

    /// Types that are dropped silently instead of answered with an error.
    pub const BEST_EFFORT: [&'static str; 2] = ["cursor-position", "user-info"];
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<JsonObject, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<JsonObject>::deserialize(deserializer)?.unwrap_or_default())
}

/// Result of decoding one well-formed frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Message(ClientMessage),
    /// A JSON object whose `type` is missing or not recognised.
    Unknown(String),
    /// A best-effort type whose payload did not have the expected shape.
    Dropped(String),
}

#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("frame is not a json object")]
    NotAnObject,
}

/// Decode one inbound text frame.
///
/// # Errors
///
/// Returns an error if the text is not a JSON object, or if `join-room`,
/// `leave-room` or `update-content` carries fields of the wrong shape.
pub fn decode(text: &str) -> Result<Inbound, MessageError> {
    let value: Value = serde_json::from_str(text)?;
    let Some(object) = value.as_object() else {
        return Err(MessageError::NotAnObject);
    };

    let kind = object.get("type").and_then(Value::as_str).unwrap_or_default();
    if !ClientMessage::TYPES.contains(&kind) {
        return Ok(Inbound::Unknown(kind.to_owned()));
    }

    match ClientMessage::deserialize(&value) {
        Ok(msg) => Ok(Inbound::Message(msg)),
        Err(_) if ClientMessage::BEST_EFFORT.contains(&kind) => Ok(Inbound::Dropped(kind.to_owned())),
        Err(e) => Err(e.into()),
    }
}

/// Treat absent and empty ids alike.
#[must_use]
pub fn required(id: Option<&str>) -> Option<&str> {
    id.filter(|s| !s.is_empty())
}

// =============================================================================
// OUTBOUND
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Error {
        message: String,
    },
    UserJoined {
        user: UserSummary,
    },
    ProjectState {
        state: JsonObject,
    },
    UsersInRoom {
        users: Vec<UserInfo>,
    },
    UserLeft {
        user_id: String,
    },
    ContentUpdate {
        content_update: JsonObject,
        user_id: String,
    },
    CursorPosition {
        #[serde(skip_serializing_if = "Option::is_none")]
        page_id: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        block_id: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        position: Option<Value>,
        user_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        user: Option<UserInfo>,
    },
    UserUpdated {
        user: UserInfo,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// The wire `type` tag, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Error { .. } => "error",
            Self::UserJoined { .. } => "user-joined",
            Self::ProjectState { .. } => "project-state",
            Self::UsersInRoom { .. } => "users-in-room",
            Self::UserLeft { .. } => "user-left",
            Self::ContentUpdate { .. } => "content-update",
            Self::CursorPosition { .. } => "cursor-position",
            Self::UserUpdated { .. } => "user-updated",
        }
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
