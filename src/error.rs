//! Error taxonomy for the multiplexer.
//!
//! DESIGN
//! ======
//! - `TransportError` covers the channel: connect failures, socket errors,
//!   undecodable frames. The supervisor recovers from all of them.
//! - `MuxError` is what callers see. Only `Remote` carries an application
//!   error, and it reaches exactly the one request whose response held it.

use serde_json::Value;

use frames::{CodecError, NameError};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    #[error("frame decode failed: {0}")]
    Decode(#[from] CodecError),
    #[error("stream error: {0}")]
    Stream(String),
    #[error("channel closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocket(Box::new(err))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MuxError {
    #[error("invalid method name: {0}")]
    InvalidMethod(#[from] NameError),
    #[error("stream is not open")]
    NotConnected,
    #[error("remote error: {0}")]
    Remote(Value),
    #[error("stream disconnected before a response arrived")]
    Disconnected,
    #[error("multiplexer shut down")]
    Shutdown,
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
}

impl MuxError {
    /// Human-readable message of a remote error.
    ///
    /// Handles both bare strings and `{ "message": ... }` objects.
    #[must_use]
    pub fn remote_message(&self) -> Option<&str> {
        let Self::Remote(value) = self else {
            return None;
        };
        value
            .as_str()
            .or_else(|| value.get("message").and_then(Value::as_str))
    }
}
