//! Ask two model providers the same question and follow both answers as they
//! stream in.
//!
//! The [`conversation`] module holds the synchronous state machine. The
//! [`session`] module runs it on a task, fans each submission out to the two
//! [`llm`] providers, and mirrors history into a [`store`].

pub mod config;
pub mod conversation;
mod handlers;
pub mod llm;
mod response;
pub mod server;
pub mod session;
pub mod store;
