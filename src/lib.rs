//! Collaborative room server for the course authoring tool.
//!
//! Clients connect over a WebSocket, join a room by id, and share a live
//! project document plus presence (who is here, where their cursor is).
//! Room state is in memory on a single node; snapshots are written to JSON
//! files on demand.

pub mod config;
pub mod message;
pub mod routes;
pub mod services;
pub mod state;
