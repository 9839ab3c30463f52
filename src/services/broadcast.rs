//! Broadcast service — fan-out of one message to a room's clients.
//!
//! DESIGN
//! ======
//! Called while the caller holds the registry lock, so it must never wait:
//! each client gets a `try_send` onto its bounded channel. A full or closed
//! channel is logged and skipped; the rest of the room still receives the
//! message. Closing the connection is left to its own websocket task.

use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;
use uuid::Uuid;

use crate::message::ServerMessage;
use crate::state::Room;

/// Send `message` to every client in `room` except `exclude`.
/// Returns the number of clients the message was queued for.
pub fn fan_out(room: &Room, message: &ServerMessage, exclude: Option<Uuid>) -> usize {
    let mut delivered = 0;
    for (conn_id, tx) in &room.clients {
        if exclude == Some(*conn_id) {
            continue;
        }
        match tx.try_send(message.clone()) {
            Ok(()) => delivered += 1,
            Err(TrySendError::Full(_)) => {
                warn!(room_id = %room.id, %conn_id, kind = message.kind(), "broadcast: client queue full, message dropped");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(room_id = %room.id, %conn_id, kind = message.kind(), "broadcast: client channel closed");
            }
        }
    }
    delivered
}

#[cfg(test)]
#[path = "broadcast_test.rs"]
mod tests;
