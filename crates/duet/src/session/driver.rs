//! The session task.
//!
//! One task owns the [`Conversation`] and applies every change to it, in the
//! order it receives them: user commands from [`SessionHandle`]s, and token and
//! settlement events from the two provider tasks. Nothing else touches the
//! state, so it needs no lock. Snapshots go out through a `watch` channel.
//!
//! ```text
//!  SessionHandle ──Command──▶ ┌──────────────┐ ──watch──▶ presentation
//!                             │ session task │
//!  provider A task ─Event──▶  │ Conversation │ ──save──▶ KeyValueStore
//!  provider B task ─Event──▶  └──────────────┘
//! ```

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

use super::persist::Persistence;
use crate::conversation::{
    Changes, Conversation, Phase, SessionState, Slot, StreamTicket, Submission, SubmitRejected,
};
use crate::llm::{LLMError, ProviderError, ProviderPair};

const COMMAND_BUFFER: usize = 32;

/// The session task has stopped.
#[derive(Debug, Clone, Copy, Error)]
#[error("session is closed")]
pub struct SessionClosed;

enum Command {
    Submit {
        prompt: Option<String>,
        reply: oneshot::Sender<Result<u64, SubmitRejected>>,
    },
    Replay {
        index: usize,
        reply: oneshot::Sender<Result<u64, SubmitRejected>>,
    },
    NewChat {
        reply: oneshot::Sender<()>,
    },
    SetInput {
        text: String,
        reply: oneshot::Sender<()>,
    },
}

enum StreamEvent {
    Token {
        ticket: StreamTicket,
        chunk: String,
    },
    Finished {
        ticket: StreamTicket,
        result: Result<String, ProviderError>,
    },
}

/// Cheap, cloneable access to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
}

impl SessionHandle {
    /// Spawn the session task, seeded from persisted history and prompt log.
    pub fn spawn(providers: ProviderPair, persistence: Persistence) -> Self {
        let (history, prompt_log) = persistence.load();
        info!(
            turns = history.len(),
            prompts = prompt_log.len(),
            "Session loaded"
        );
        let conversation = Conversation::new(history, prompt_log);

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(conversation.state().clone());

        let task = SessionTask {
            conversation,
            providers,
            persistence,
            commands: command_rx,
            events: event_rx,
            event_tx,
            state: state_tx,
        };
        tokio::spawn(task.run());

        Self {
            commands: command_tx,
            state: state_rx,
        }
    }

    /// Submit `prompt` as a fresh prompt. `None` or an empty prompt submits
    /// the input buffer.
    ///
    /// Returns the submission's epoch, or why it was ignored.
    pub async fn submit(
        &self,
        prompt: Option<String>,
    ) -> Result<Result<u64, SubmitRejected>, SessionClosed> {
        self.request(|reply| Command::Submit { prompt, reply }).await
    }

    /// Ask the prompt-log entry at `index` (0-based) again without logging
    /// it twice.
    pub async fn replay(
        &self,
        index: usize,
    ) -> Result<Result<u64, SubmitRejected>, SessionClosed> {
        self.request(|reply| Command::Replay { index, reply }).await
    }

    pub async fn start_new_chat(&self) -> Result<(), SessionClosed> {
        self.request(|reply| Command::NewChat { reply }).await
    }

    pub async fn set_input(&self, text: impl Into<String>) -> Result<(), SessionClosed> {
        let text = text.into();
        self.request(|reply| Command::SetInput { text, reply }).await
    }

    /// True once the session task has stopped.
    pub fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Current state.
    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// A receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Wait until no submission is in flight and return the state.
    pub async fn wait_settled(&self) -> Result<SessionState, SessionClosed> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|s| s.phase() != Phase::AwaitingResponses)
            .await
            .map_err(|_| SessionClosed)?;
        Ok(settled.clone())
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, SessionClosed> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| SessionClosed)?;
        rx.await.map_err(|_| SessionClosed)
    }
}

struct SessionTask {
    conversation: Conversation,
    providers: ProviderPair,
    persistence: Persistence,
    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    state: watch::Sender<SessionState>,
}

impl SessionTask {
    async fn run(mut self) {
        let mut handles_open = true;
        loop {
            tokio::select! {
                command = self.commands.recv(), if handles_open => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        debug!("All session handles dropped");
                        handles_open = false;
                    }
                },
                Some(event) = self.events.recv() => self.handle_event(event).await,
            }

            // Let in-flight streams land in history before exiting.
            if !handles_open && self.conversation.phase() != Phase::AwaitingResponses {
                break;
            }
        }
        debug!("Session task stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { prompt, reply } => {
                let accepted = self.conversation.submit(prompt.as_deref());
                let outcome = self.start(accepted).await;
                let _ = reply.send(outcome);
            }
            Command::Replay { index, reply } => {
                let accepted = self.conversation.replay(index);
                let outcome = self.start(accepted).await;
                let _ = reply.send(outcome);
            }
            Command::NewChat { reply } => {
                let changes = self.conversation.start_new_chat();
                self.commit(changes).await;
                let _ = reply.send(());
            }
            Command::SetInput { text, reply } => {
                self.conversation.set_input(text);
                self.publish();
                let _ = reply.send(());
            }
        }
    }

    async fn handle_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Token { ticket, chunk } => {
                if self.conversation.push_token(ticket, &chunk) {
                    self.publish();
                }
            }
            StreamEvent::Finished { ticket, result } => {
                let changes = self.conversation.finish(ticket, result);
                self.commit(changes).await;
                if self.conversation.phase() == Phase::Settled {
                    debug!(epoch = ticket.epoch, "Submission settled");
                }
            }
        }
    }

    async fn start(
        &self,
        accepted: Result<(Submission, Changes), SubmitRejected>,
    ) -> Result<u64, SubmitRejected> {
        match accepted {
            Ok((submission, changes)) => {
                self.launch(&submission);
                self.commit(changes).await;
                Ok(submission.epoch)
            }
            Err(rejected) => {
                debug!(reason = %rejected, "Submission ignored");
                Err(rejected)
            }
        }
    }

    /// Start both providers on their own tasks.
    fn launch(&self, submission: &Submission) {
        for slot in Slot::ALL {
            let adapter = self.providers.get(slot).adapter.clone();
            let ticket = submission.ticket(slot);
            let history = submission.history.clone();
            let prompt = submission.prompt.clone();
            let events = self.event_tx.clone();

            tokio::spawn(async move {
                let tokens = events.clone();
                let on_token = move |chunk: &str| {
                    let _ = tokens.send(StreamEvent::Token {
                        ticket,
                        chunk: chunk.to_string(),
                    });
                };

                let invocation = adapter.invoke(&history, &prompt, &on_token);
                let result = match AssertUnwindSafe(invocation).catch_unwind().await {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(slot = %slot, provider = adapter.tag(), "Provider adapter panicked");
                        Err(ProviderError::new(adapter.tag(), LLMError::Panicked))
                    }
                };

                let _ = events.send(StreamEvent::Finished { ticket, result });
            });
        }
    }

    /// Persist what changed, then publish the new state.
    async fn commit(&self, changes: Changes) {
        if changes.any() {
            self.persistence.save(self.conversation.state(), changes).await;
        }
        self.publish();
    }

    fn publish(&self) {
        self.state.send_replace(self.conversation.state().clone());
    }
}
