use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use super::base::{Recognizer, RecognizerEvent, STTError};

/// Recognizer that accepts audio and never produces transcripts.
///
/// Text turns still work through the `listen` control message.
#[derive(Debug, Default)]
pub struct NullRecognizer {
    frames: AtomicU64,
}

impl NullRecognizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audio frames received so far
    pub fn frames_received(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Recognizer for NullRecognizer {
    async fn open_channel(
        &self,
        session_id: &str,
        _events: mpsc::Sender<RecognizerEvent>,
    ) -> Result<(), STTError> {
        debug!(session_id, "Null recognizer bound");
        Ok(())
    }

    async fn send_audio(&self, _audio: Bytes) -> Result<(), STTError> {
        self.frames.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
