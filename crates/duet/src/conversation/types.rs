//! Core types for the dual-provider conversation.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two fixed provider columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub const ALL: [Slot; 2] = [Slot::A, Slot::B];

    /// The history role a completed response from this slot is recorded under.
    pub fn role(self) -> Role {
        match self {
            Slot::A => Role::ModelA,
            Slot::B => Role::ModelB,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::A => write!(f, "a"),
            Slot::B => write!(f, "b"),
        }
    }
}

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    ModelA,
    ModelB,
}

/// One attributed message in the conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn model(slot: Slot, content: impl Into<String>) -> Self {
        Self {
            role: slot.role(),
            content: content.into(),
        }
    }
}

/// Output and status of one provider for the current submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamState {
    pub text: String,
    pub loading: bool,
    pub error: Option<String>,
}

impl StreamState {
    /// State at the start of a submission: empty and loading.
    pub fn started() -> Self {
        Self {
            text: String::new(),
            loading: true,
            error: None,
        }
    }
}

/// Where the session is in the submit / settle cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing has been submitted since the session started or the last new chat.
    Idle,
    /// A submission is in flight and at least one provider is still loading.
    AwaitingResponses,
    /// Both providers finished, successfully or not.
    Settled,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub history: Vec<Turn>,
    pub prompt_log: Vec<String>,
    pub a: StreamState,
    pub b: StreamState,
    pub input: String,
    pub recent_prompt: String,
    pub show_result: bool,
}

impl SessionState {
    pub fn stream(&self, slot: Slot) -> &StreamState {
        match slot {
            Slot::A => &self.a,
            Slot::B => &self.b,
        }
    }

    pub(crate) fn stream_mut(&mut self, slot: Slot) -> &mut StreamState {
        match slot {
            Slot::A => &mut self.a,
            Slot::B => &mut self.b,
        }
    }

    /// True while either provider is still streaming.
    pub fn is_loading(&self) -> bool {
        self.a.loading || self.b.loading
    }

    pub fn phase(&self) -> Phase {
        if self.is_loading() {
            Phase::AwaitingResponses
        } else if self.show_result {
            Phase::Settled
        } else {
            Phase::Idle
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turn_json_shape() {
        let turn = Turn::model(Slot::B, "hi B");
        let json = serde_json::to_string(&turn).unwrap();
        assert_eq!(json, r#"{"role":"model_b","content":"hi B"}"#);

        let parsed: Turn = serde_json::from_str(r#"{"role":"user","content":"hello"}"#).unwrap();
        assert_eq!(parsed, Turn::user("hello"));
    }

    #[test]
    fn phase_follows_flags() {
        let mut state = SessionState::default();
        assert_eq!(state.phase(), Phase::Idle);

        state.show_result = true;
        state.a = StreamState::started();
        state.b = StreamState::started();
        assert_eq!(state.phase(), Phase::AwaitingResponses);

        state.b.loading = false;
        assert_eq!(state.phase(), Phase::AwaitingResponses);

        state.a.loading = false;
        assert_eq!(state.phase(), Phase::Settled);
    }

    #[test]
    fn slot_roles() {
        assert_eq!(Slot::A.role(), Role::ModelA);
        assert_eq!(Slot::B.role(), Role::ModelB);
        assert_eq!(Slot::A.to_string(), "a");
    }
}
