//! V1 API handlers.

mod session;

pub use session::{get_session, new_chat, replay, session_events, set_input, submit};
