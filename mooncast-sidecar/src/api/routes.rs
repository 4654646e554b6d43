use axum::{
    http::Method,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{cast, health, hosts};
use super::state::AppState;
use super::websocket::ws_handler;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Cast requests come from controllers anywhere on the LAN
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        // Health check
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        // Cast control
        .route("/cast", post(cast::start_cast))
        .route("/stop", post(cast::stop_cast))
        .route("/status", get(cast::get_status))
        // Host registry
        .route("/hosts", get(hosts::list_hosts))
        .route("/hosts/:address", delete(hosts::delete_host))
        // WebSocket
        .route("/ws/:client_id", get(ws_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
