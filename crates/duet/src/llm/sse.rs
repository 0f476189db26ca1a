//! Minimal server-sent events reader.
//!
//! Yields the payload of every `data:` line. Comments (`: keep-alive`), event
//! names and blank lines are skipped. Lines may be split across chunks,
//! including in the middle of a multibyte character.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt, future};

use super::error::LLMError;

/// What one `data:` payload means to a provider's stream format.
#[derive(Debug, PartialEq, Eq)]
pub enum Payload {
    Token(String),
    /// Nothing to show (role-only deltas, usage reports, unknown payloads).
    Skip,
    /// Explicit end of stream.
    Done,
}

pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, LLMError>> + Send>>;

/// Turn an SSE response body into a stream of text tokens.
///
/// `parse` interprets each `data:` payload. The stream ends at
/// [`Payload::Done`], at end of body, or after the first error.
pub fn token_stream<S, E, F>(body: S, mut parse: F) -> TokenStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Into<LLMError> + 'static,
    F: FnMut(&str) -> Result<Payload, LLMError> + Send + 'static,
{
    let tokens = SseDataStream::new(Box::pin(body))
        .map(move |data| data.and_then(|d| parse(&d)))
        .take_while(|payload| future::ready(!matches!(payload, Ok(Payload::Done))))
        .filter_map(|payload| {
            future::ready(match payload {
                Ok(Payload::Token(token)) => Some(Ok(token)),
                Ok(_) => None,
                Err(e) => Some(Err(e)),
            })
        });
    Box::pin(tokens)
}

pub struct SseDataStream<S> {
    inner: S,
    buffer: Vec<u8>,
    done: bool,
}

impl<S> SseDataStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: Vec::new(),
            done: false,
        }
    }

    /// Pop the next complete line from the buffer, if any.
    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=end).collect();
        Some(String::from_utf8_lossy(&line).trim_end().to_string())
    }
}

fn data_payload(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?;
    Some(data.strip_prefix(' ').unwrap_or(data))
}

impl<S, E> Stream for SseDataStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: Into<LLMError>,
{
    type Item = Result<String, LLMError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(line) = self.next_line() {
                if let Some(data) = data_payload(&line) {
                    return Poll::Ready(Some(Ok(data.to_string())));
                }
                continue;
            }

            if self.done {
                // Unterminated final line
                if self.buffer.is_empty() {
                    return Poll::Ready(None);
                }
                self.buffer.push(b'\n');
                continue;
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => self.buffer.extend_from_slice(&bytes),
                Poll::Ready(Some(Err(e))) => {
                    self.done = true;
                    self.buffer.clear();
                    return Poll::Ready(Some(Err(e.into())));
                }
                Poll::Ready(None) => self.done = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
