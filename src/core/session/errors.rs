//! Error types for session operations

use crate::core::{stt::STTError, tts::TTSError};

/// Error types for session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("TTS error: {0}")]
    TTSError(#[from] TTSError),
    #[error("STT error: {0}")]
    STTError(#[from] STTError),
    #[error("Session is closed")]
    Closed,
    #[error("Synthesis pipeline is closed")]
    PipelineClosed,
    #[error("Outbound channel closed")]
    OutboundClosed,
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
