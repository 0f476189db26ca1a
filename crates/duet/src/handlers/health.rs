use axum::extract::State;
use axum::http::StatusCode;

use crate::server::AppState;

pub async fn livez() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// Ready while the session task is running.
pub async fn readyz(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.session.is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, "session closed")
    } else {
        (StatusCode::OK, "ok")
    }
}
