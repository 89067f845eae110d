//! WebSocket error types

use thiserror::Error;

/// WebSocket handler error types
#[derive(Debug, Error)]
pub enum WebSocketError {
    /// Text frame that is not a known control message
    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    /// `server` message with an action this server does not implement
    #[error("Unsupported server action: {0}")]
    UnsupportedAction(String),

    /// The session is closing and accepts no more turns
    #[error("Session is closing")]
    SessionClosing,
}

impl WebSocketError {
    /// Convert error to outgoing message format
    pub fn to_message(&self) -> String {
        self.to_string()
    }
}

/// Result type for WebSocket operations
pub type WebSocketResult<T> = Result<T, WebSocketError>;
