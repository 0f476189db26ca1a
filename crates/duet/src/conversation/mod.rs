//! Conversation state: turn history, per-provider streams, and the submit cycle.

pub mod history;
mod machine;
mod types;

pub use machine::{Changes, Conversation, StreamTicket, Submission, SubmitRejected};
pub use types::{Phase, Role, SessionState, Slot, StreamState, Turn};
