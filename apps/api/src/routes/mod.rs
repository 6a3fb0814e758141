pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis_handlers;
use crate::sessions::handlers as session_handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(health::health_handler))
        // Stateless analysis
        .route("/api/v1/analyze", post(analysis_handlers::handle_analyze))
        // Persisted sessions
        .route(
            "/api/v1/analysis",
            post(session_handlers::handle_start_session).get(session_handlers::handle_list_sessions),
        )
        .route(
            "/api/v1/analysis/:session_id",
            get(session_handlers::handle_get_session),
        )
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
