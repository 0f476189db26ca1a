//! History assembly for provider requests.
//!
//! Both providers are given the same canonical sequence of turns. Each adapter
//! then folds the two model roles into whatever its API calls the other side
//! of the conversation.

use std::sync::Arc;

use super::types::{Role, Turn};

/// Role vocabulary shared by providers that only know "user" and "model".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Model,
}

impl From<Role> for Speaker {
    fn from(role: Role) -> Self {
        match role {
            Role::User => Speaker::User,
            Role::ModelA | Role::ModelB => Speaker::Model,
        }
    }
}

/// Snapshot sent to both providers: committed history plus the new user turn.
pub fn request_history(history: &[Turn], prompt: &str) -> Arc<[Turn]> {
    history
        .iter()
        .cloned()
        .chain(std::iter::once(Turn::user(prompt)))
        .collect()
}

/// Group consecutive turns that fold to the same speaker.
///
/// Returns `(speaker, contents)` runs in order, never two adjacent runs with
/// the same speaker.
pub fn fold_runs(history: &[Turn]) -> Vec<(Speaker, Vec<&str>)> {
    let mut runs: Vec<(Speaker, Vec<&str>)> = Vec::new();
    for turn in history {
        let speaker = Speaker::from(turn.role);
        match runs.last_mut() {
            Some((last, contents)) if *last == speaker => contents.push(&turn.content),
            _ => runs.push((speaker, vec![&turn.content])),
        }
    }
    runs
}
