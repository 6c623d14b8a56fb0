//! livedash-stream: push channel for a single subject.
//! Owns the WebSocket lifecycle (connect, close, fixed-delay reconnect)
//! and routes decoded frames to typed subscriber callbacks.

pub mod connection;
pub mod dispatch;
pub mod error;

pub use connection::{LinkHooks, StreamConfig, StreamConnection, SubjectStream};
pub use dispatch::{DispatchOutcome, Dispatcher};
pub use error::StreamError;
pub use livedash_core::types;
