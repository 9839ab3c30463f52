//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own the room registry logic and snapshot persistence so
//! route handlers can stay focused on protocol translation.

pub mod broadcast;
pub mod color;
pub mod persistence;
pub mod room;
