//! Session HTTP handlers.

use std::convert::Infallible;
use std::time::Duration;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::WatchStream;

use crate::conversation::{Phase, SessionState, SubmitRejected};
use crate::response;
use crate::server::{AppState, Labels};
use crate::session::SessionClosed;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Serialize)]
pub struct SessionView {
    #[serde(flatten)]
    state: SessionState,
    phase: Phase,
    providers: Labels,
}

impl SessionView {
    fn new(state: SessionState, labels: &Labels) -> Self {
        Self {
            phase: state.phase(),
            state,
            providers: labels.clone(),
        }
    }
}

#[derive(Deserialize)]
pub struct SetInputRequest {
    text: String,
}

#[derive(Deserialize, Default)]
pub struct SubmitRequest {
    #[serde(default)]
    prompt: Option<String>,
}

#[derive(Deserialize)]
pub struct ReplayRequest {
    index: usize,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    accepted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
}

impl From<Result<u64, SubmitRejected>> for SubmitResponse {
    fn from(outcome: Result<u64, SubmitRejected>) -> Self {
        let reason = match outcome {
            Ok(_) => None,
            Err(SubmitRejected::EmptyPrompt) => Some("empty_prompt"),
            Err(SubmitRejected::InFlight) => Some("in_flight"),
            Err(SubmitRejected::NoSuchPrompt { .. }) => Some("no_such_prompt"),
        };
        Self {
            accepted: reason.is_none(),
            reason,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/v1/session
pub async fn get_session(State(state): State<AppState>) -> Json<SessionView> {
    Json(SessionView::new(state.session.snapshot(), &state.labels))
}

/// PUT /api/v1/session/input
pub async fn set_input(
    State(state): State<AppState>,
    Json(req): Json<SetInputRequest>,
) -> Response {
    match state.session.set_input(req.text).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => closed(e),
    }
}

/// POST /api/v1/session/submit
///
/// Without a `prompt`, or with an empty one, the current input buffer is
/// submitted.
pub async fn submit(State(state): State<AppState>, Json(req): Json<SubmitRequest>) -> Response {
    match state.session.submit(req.prompt).await {
        Ok(outcome) => Json(SubmitResponse::from(outcome)).into_response(),
        Err(e) => closed(e),
    }
}

/// POST /api/v1/session/replay
///
/// Re-asks the prompt-log entry at `index` (0-based).
pub async fn replay(State(state): State<AppState>, Json(req): Json<ReplayRequest>) -> Response {
    match state.session.replay(req.index).await {
        Ok(Err(rejected @ SubmitRejected::NoSuchPrompt { .. })) => {
            response::not_found(rejected.to_string()).into_response()
        }
        Ok(outcome) => Json(SubmitResponse::from(outcome)).into_response(),
        Err(e) => closed(e),
    }
}

/// POST /api/v1/session/new-chat
pub async fn new_chat(State(state): State<AppState>) -> Response {
    match state.session.start_new_chat().await {
        Ok(()) => {
            Json(SessionView::new(state.session.snapshot(), &state.labels)).into_response()
        }
        Err(e) => closed(e),
    }
}

/// GET /api/v1/session/events
///
/// Server-sent events. One `state` event carrying a [`SessionView`] is sent
/// on connect and after every change.
pub async fn session_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let labels = state.labels.clone();
    let events = WatchStream::new(state.session.subscribe()).map(move |snapshot| {
        let event = Event::default()
            .event("state")
            .json_data(SessionView::new(snapshot, &labels))
            .unwrap_or_else(|_| Event::default().event("state").data("{}"));
        Ok(event)
    });

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.keep_alive_interval_seconds))
        .text("keep-alive");

    Sse::new(events).keep_alive(keep_alive)
}

// ============================================================================
// Helpers
// ============================================================================

fn closed(e: SessionClosed) -> Response {
    response::service_unavailable(e.to_string()).into_response()
}
