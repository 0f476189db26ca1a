use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use serde::Serialize;
use tower_http::timeout::TimeoutLayer;

use crate::handlers;
use crate::llm::ProviderPair;
use crate::session::SessionHandle;

/// Column labels shown by front ends.
#[derive(Debug, Clone, Serialize)]
pub struct Labels {
    pub a: String,
    pub b: String,
}

impl From<&ProviderPair> for Labels {
    fn from(providers: &ProviderPair) -> Self {
        Self {
            a: providers.a.label.clone(),
            b: providers.b.label.clone(),
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub labels: Labels,
    pub keep_alive_interval_seconds: u64,
}

pub fn build_app(state: AppState, request_timeout_secs: u64) -> Router {
    let timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(request_timeout_secs),
    );

    // The event stream is added after the timeout layer so it stays open.
    let api_v1 = Router::new()
        .route("/session", get(handlers::v1::get_session))
        .route("/session/input", put(handlers::v1::set_input))
        .route("/session/submit", post(handlers::v1::submit))
        .route("/session/replay", post(handlers::v1::replay))
        .route("/session/new-chat", post(handlers::v1::new_chat))
        .layer(timeout)
        .route("/session/events", get(handlers::v1::session_events));

    Router::new()
        .route("/livez", get(handlers::livez))
        .route("/readyz", get(handlers::readyz))
        .nest("/api/v1", api_v1)
        .with_state(state)
}
