mod health;
mod sounds;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/status", get(health::status))
        .route("/ws", get(crate::viewers::socket::ws_upgrade))
        .route("/send-sound", post(sounds::send_sound))
        .route("/add-sound", post(sounds::add_sound))
        .route("/delete-sound", post(sounds::delete_sound))
        .route("/save-sound", post(sounds::save_sound))
        .route("/swap-sound", post(sounds::swap_sound))
        .route("/quickplay", get(sounds::quickplay))
        .fallback_service(static_files)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
