use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub async fn health() -> &'static str {
    "ok"
}

pub async fn version() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "git_sha": env!("GIT_SHA"),
    }))
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let session = *state.session.borrow();
    let board = state.board.snapshot().await.ok();
    Json(serde_json::json!({
        "data": {
            "session": session,
            "viewers": state.viewers.len(),
            "occupied_slots": board.as_ref().map(|b| b.table.occupied_count()),
            "in_channel": board.as_ref().map(|b| b.presence),
            "stored_sounds": state.stored.load().len(),
        }
    }))
}
