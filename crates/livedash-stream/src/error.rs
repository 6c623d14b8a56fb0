//! Error types for the push channel.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket transport error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}
