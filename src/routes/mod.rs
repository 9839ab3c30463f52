//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! The room server is embedded behind the course authoring tool. It exposes
//! the collaboration websocket, a health probe, and a small management API
//! an admin action or external scheduler can use to snapshot rooms.

pub mod rooms;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/api/rooms", get(rooms::list_rooms))
        .route(
            "/api/rooms/{id}/snapshot",
            post(rooms::save_snapshot).get(rooms::load_snapshot),
        )
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
