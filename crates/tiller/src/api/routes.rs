//! API route definitions.

use axum::{
    Router,
    routing::{get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::handlers;
use super::state::AppState;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(handlers::health))
        // Session management
        .route(
            "/sessions",
            get(handlers::list_sessions).post(handlers::create_session),
        )
        .route(
            "/sessions/{session_id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route(
            "/sessions/{session_id}/rename",
            patch(handlers::rename_session),
        )
        // Turn control
        .route("/sessions/{session_id}/start", post(handlers::start_turn))
        .route("/sessions/{session_id}/input", post(handlers::send_input))
        .route("/sessions/{session_id}/stop", post(handlers::stop_session))
        // Events: poll, external ingest, live SSE
        .route(
            "/sessions/{session_id}/events",
            get(handlers::poll_events).post(handlers::ingest_event),
        )
        .route(
            "/sessions/{session_id}/events/stream",
            get(handlers::stream_events),
        )
        // Approvals
        .route(
            "/sessions/{session_id}/approvals/{request_id}/respond",
            post(handlers::respond_approval),
        )
        // Bridge binding
        .route(
            "/sessions/{session_id}/bridge",
            post(handlers::bind_bridge).delete(handlers::unbind_bridge),
        )
        .layer(trace_layer)
        .layer(CorsLayer::permissive())
        .with_state(state)
}
