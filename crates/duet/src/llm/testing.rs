//! Scripted adapters and a local HTTP endpoint for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::http::{HeaderMap, Method, StatusCode, Uri, header};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use super::error::LLMError;
use super::provider::{OnToken, ProviderAdapter, ProviderError};
use super::registry::{ProviderEntry, ProviderPair};
use crate::conversation::Turn;

/// Emits fixed chunks, then resolves or fails.
pub struct ScriptedAdapter {
    tag: String,
    chunks: Vec<String>,
    outcome: Result<String, String>,
    /// When set, the adapter waits here after emitting its chunks.
    gate: Option<Arc<Notify>>,
    panics: bool,
    /// Request histories this adapter was invoked with.
    pub calls: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedAdapter {
    /// Streams `chunks` and resolves to their concatenation.
    pub fn streaming(tag: &str, chunks: &[&str]) -> Self {
        Self {
            tag: tag.to_string(),
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            outcome: Ok(chunks.concat()),
            gate: None,
            panics: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Streams `chunks` and then fails with `message`.
    pub fn failing(tag: &str, chunks: &[&str], message: &str) -> Self {
        Self {
            outcome: Err(message.to_string()),
            ..Self::streaming(tag, chunks)
        }
    }

    pub fn panicking(tag: &str) -> Self {
        Self {
            panics: true,
            ..Self::streaming(tag, &[])
        }
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn tag(&self) -> &str {
        &self.tag
    }

    async fn invoke(
        &self,
        history: &[Turn],
        _prompt: &str,
        on_token: OnToken<'_>,
    ) -> Result<String, ProviderError> {
        self.calls.lock().unwrap().push(history.to_vec());
        if self.panics {
            panic!("scripted adapter panic");
        }
        for chunk in &self.chunks {
            on_token(chunk);
            tokio::task::yield_now().await;
        }
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        self.outcome.clone().map_err(|message| {
            ProviderError::new(&self.tag, LLMError::Stream(message))
        })
    }
}

/// A provider pair labelled "A" and "B".
pub fn pair(a: Arc<dyn ProviderAdapter>, b: Arc<dyn ProviderAdapter>) -> ProviderPair {
    ProviderPair::new(
        ProviderEntry {
            label: "A".into(),
            adapter: a,
        },
        ProviderEntry {
            label: "B".into(),
            adapter: b,
        },
    )
}

/// One request seen by [`mock_server`].
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// JSON body, or `Null` if it did not parse.
    pub body: Value,
}

pub type Recorded = Arc<Mutex<Vec<RecordedRequest>>>;

/// Serve `body` with `status` on every path of an ephemeral local port.
///
/// Returns the base URL and the requests received so far.
pub async fn mock_server(status: StatusCode, body: &'static str) -> (String, Recorded) {
    let recorded = Recorded::default();
    let requests = recorded.clone();
    let router = Router::new().fallback(
        move |method: Method, uri: Uri, headers: HeaderMap, bytes: Bytes| {
            let requests = requests.clone();
            async move {
                requests.lock().unwrap().push(RecordedRequest {
                    method,
                    uri,
                    headers,
                    body: serde_json::from_slice(&bytes).unwrap_or(Value::Null),
                });
                (status, [(header::CONTENT_TYPE, "text/event-stream")], body)
            }
        },
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    (format!("http://{addr}"), recorded)
}
