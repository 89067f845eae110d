use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Events emitted by a recognizer for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Voice activity was detected on the inbound audio.
    ///
    /// The session treats this as barge-in.
    VoiceActivity,
    /// A finished utterance
    Transcript { text: String },
}

/// Error types for STT operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum STTError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Audio processing error: {0}")]
    AudioProcessingError(String),
    #[error("Provider error: {0}")]
    ProviderError(String),
    #[error("Channel closed")]
    ChannelClosed,
}

/// Base trait for speech-recognition backends
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Bind the recognizer to a session.
    ///
    /// Events for the session are delivered on `events` until the recognizer
    /// is closed or the receiver is dropped.
    async fn open_channel(
        &self,
        session_id: &str,
        events: mpsc::Sender<RecognizerEvent>,
    ) -> Result<(), STTError>;

    /// Feed one inbound audio frame
    async fn send_audio(&self, audio: Bytes) -> Result<(), STTError>;

    /// Close the recognizer. Must be safe to call more than once.
    async fn close(&self) -> Result<(), STTError> {
        Ok(())
    }
}
