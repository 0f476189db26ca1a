//! The running session: one task owning the conversation, plus its persistence.

mod driver;
mod persist;

pub use driver::{SessionClosed, SessionHandle};
pub use persist::{HISTORY_KEY, PROMPT_LOG_KEY, Persistence};
