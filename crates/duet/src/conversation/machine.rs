//! The conversation state machine.
//!
//! `Conversation` is synchronous and owns the whole [`SessionState`]. The
//! session driver feeds it user intents and stream events; it never awaits.
//!
//! ```text
//!   Idle ──submit──▶ AwaitingResponses ──both settled──▶ Settled
//!                          ▲                                │
//!                          └────────────submit──────────────┘
//! ```

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use super::history::request_history;
use super::types::{Phase, SessionState, Slot, StreamState, Turn};
use crate::llm::ProviderError;

/// Why a submission was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitRejected {
    #[error("prompt is empty")]
    EmptyPrompt,

    #[error("a submission is already in flight")]
    InFlight,

    #[error("no prompt at index {index}")]
    NoSuchPrompt { index: usize },
}

/// How a prompt reached the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PromptOrigin {
    /// Typed by the user; recorded in the prompt log.
    Fresh,
    /// Picked from the prompt log; not recorded again.
    Replay,
}

/// Identifies which stream of which submission an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamTicket {
    pub epoch: u64,
    pub slot: Slot,
}

/// An accepted submission, ready to be sent to both providers.
#[derive(Debug, Clone)]
pub struct Submission {
    pub epoch: u64,
    pub prompt: String,
    /// Committed history plus the new user turn, shared by both providers.
    pub history: Arc<[Turn]>,
}

impl Submission {
    pub fn ticket(&self, slot: Slot) -> StreamTicket {
        StreamTicket {
            epoch: self.epoch,
            slot,
        }
    }
}

/// Which persisted parts of the state an operation changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Changes {
    pub history: bool,
    pub prompt_log: bool,
}

impl Changes {
    pub fn any(self) -> bool {
        self.history || self.prompt_log
    }
}

#[derive(Debug, Default)]
pub struct Conversation {
    state: SessionState,
    epoch: u64,
}

impl Conversation {
    /// Start a session from persisted history and prompt log.
    pub fn new(history: Vec<Turn>, prompt_log: Vec<String>) -> Self {
        Self {
            state: SessionState {
                history,
                prompt_log,
                ..SessionState::default()
            },
            epoch: 0,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn phase(&self) -> Phase {
        self.state.phase()
    }

    /// Validate and start a fresh submission.
    ///
    /// With `prompt = None`, or an empty prompt, the input buffer is
    /// submitted. On success both streams are reset to loading, the user turn
    /// is committed to history, the prompt is logged and the input buffer is
    /// cleared. On rejection nothing changes.
    pub fn submit(&mut self, prompt: Option<&str>) -> Result<(Submission, Changes), SubmitRejected> {
        if self.state.is_loading() {
            return Err(SubmitRejected::InFlight);
        }
        let prompt = match prompt {
            Some(p) if !p.is_empty() => p,
            _ => self.state.input.as_str(),
        };
        if prompt.trim().is_empty() {
            return Err(SubmitRejected::EmptyPrompt);
        }
        let prompt = prompt.to_string();
        Ok(self.start(prompt, PromptOrigin::Fresh))
    }

    /// Ask the prompt-log entry at `index` again. The log does not grow.
    pub fn replay(&mut self, index: usize) -> Result<(Submission, Changes), SubmitRejected> {
        if self.state.is_loading() {
            return Err(SubmitRejected::InFlight);
        }
        let Some(prompt) = self.state.prompt_log.get(index).cloned() else {
            return Err(SubmitRejected::NoSuchPrompt { index });
        };
        if prompt.trim().is_empty() {
            return Err(SubmitRejected::EmptyPrompt);
        }
        Ok(self.start(prompt, PromptOrigin::Replay))
    }

    fn start(&mut self, prompt: String, origin: PromptOrigin) -> (Submission, Changes) {
        self.epoch += 1;
        let history = request_history(&self.state.history, &prompt);

        self.state.a = StreamState::started();
        self.state.b = StreamState::started();
        self.state.show_result = true;
        self.state.recent_prompt = prompt.clone();
        self.state.history.push(Turn::user(prompt.as_str()));

        let mut changes = Changes {
            history: true,
            prompt_log: false,
        };
        if origin == PromptOrigin::Fresh {
            self.state.prompt_log.push(prompt.clone());
            changes.prompt_log = true;
        }
        self.state.input.clear();

        debug!(epoch = self.epoch, ?origin, "Submission accepted");

        (
            Submission {
                epoch: self.epoch,
                prompt,
                history,
            },
            changes,
        )
    }

    /// Append a streamed chunk to its provider's text.
    ///
    /// Returns false if the event is stale or its stream already settled.
    pub fn push_token(&mut self, ticket: StreamTicket, chunk: &str) -> bool {
        let Some(stream) = self.live_stream(ticket) else {
            return false;
        };
        stream.text.push_str(chunk);
        true
    }

    /// Settle one provider's stream.
    ///
    /// Success appends the provider's turn to history; failure records the
    /// error and leaves history alone. Stale or repeated settlements are
    /// ignored.
    pub fn finish(
        &mut self,
        ticket: StreamTicket,
        result: Result<String, ProviderError>,
    ) -> Changes {
        let Some(stream) = self.live_stream(ticket) else {
            debug!(slot = %ticket.slot, epoch = ticket.epoch, "Ignoring stale settlement");
            return Changes::default();
        };
        stream.loading = false;

        match result {
            Ok(full) => {
                self.state.history.push(Turn::model(ticket.slot, full));
                debug!(slot = %ticket.slot, epoch = ticket.epoch, "Provider settled");
                Changes {
                    history: true,
                    prompt_log: false,
                }
            }
            Err(e) => {
                debug!(slot = %ticket.slot, epoch = ticket.epoch, error = %e, "Provider failed");
                stream.error = Some(e.to_string());
                Changes::default()
            }
        }
    }

    /// Clear the conversation and stream status. The prompt log survives.
    pub fn start_new_chat(&mut self) -> Changes {
        // Streams still in flight belong to the old epoch and will be dropped.
        if self.state.is_loading() {
            self.epoch += 1;
        }
        let changed = !self.state.history.is_empty();

        self.state.history.clear();
        self.state.a = StreamState::default();
        self.state.b = StreamState::default();
        self.state.recent_prompt.clear();
        self.state.input.clear();
        self.state.show_result = false;

        Changes {
            history: changed,
            prompt_log: false,
        }
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.state.input = text.into();
    }

    fn live_stream(&mut self, ticket: StreamTicket) -> Option<&mut StreamState> {
        if ticket.epoch != self.epoch {
            return None;
        }
        let stream = self.state.stream_mut(ticket.slot);
        stream.loading.then_some(stream)
    }
}
