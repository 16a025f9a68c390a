use super::handlers;
use super::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Largest accepted segment upload (a 5 minute stereo 48 kHz PCM segment
/// is about 55 MB)
const MAX_SEGMENT_BYTES: usize = 128 * 1024 * 1024;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    let media = ServeDir::new(&state.media_dir);

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Call lifecycle
        .route("/calls", post(handlers::create_call))
        .route("/calls/:call_id", get(handlers::get_call))
        .route("/groups/:group_id/calls", get(handlers::poll_group))
        .route("/calls/:call_id/respond", post(handlers::respond))
        .route("/calls/:call_id/connect", post(handlers::connect))
        .route("/calls/:call_id/leave", post(handlers::leave))
        .route("/calls/:call_id/end", post(handlers::end_call))
        // Recording control
        .route(
            "/calls/:call_id/recording/start",
            post(handlers::start_recording),
        )
        .route(
            "/calls/:call_id/recording/stop",
            post(handlers::stop_recording),
        )
        .route("/calls/:call_id/recording/hide", post(handlers::hide_recording))
        .route(
            "/calls/:call_id/recording/unhide",
            post(handlers::unhide_recording),
        )
        .route(
            "/calls/:call_id/recording/disable",
            post(handlers::disable_recording),
        )
        .route(
            "/calls/:call_id/recording/segments",
            get(handlers::list_segments)
                .post(handlers::upload_segment)
                .layer(DefaultBodyLimit::max(MAX_SEGMENT_BYTES)),
        )
        // Stored segments
        .nest_service("/media", media)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
