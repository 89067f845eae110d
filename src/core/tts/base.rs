//! # Synthesizer Trait
//!
//! Abstraction over speech-synthesis backends. A synthesizer turns one
//! segment of text into an audio artifact (a transient file or an in-memory
//! buffer) and later decodes that artifact into wire frames. The two steps
//! are split so the session can start synthesis for several segments at once
//! while decoding strictly in segment order.
//!
//! ```rust,ignore
//! use talkback::core::tts::{AudioFormat, Synthesizer};
//!
//! async fn speak(tts: &dyn Synthesizer) -> talkback::core::tts::TTSResult<()> {
//!     if let Some(audio) = tts.synthesize("Hello there").await? {
//!         let frames = tts.decode(&audio, AudioFormat::Pcm)?;
//!         println!("{} frames", frames.len());
//!         if tts.owns_transient_files() {
//!             tts.discard(&audio);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Sample rate used by the wire protocol
pub const WIRE_SAMPLE_RATE: u32 = 16000;

/// Duration of one outbound audio frame in milliseconds
pub const FRAME_DURATION_MS: u32 = 60;

/// TTS-specific error types
#[derive(Debug, Clone, thiserror::Error)]
pub enum TTSError {
    #[error("Provider not ready: {0}")]
    ProviderNotReady(String),

    #[error("Audio generation failed: {0}")]
    AudioGenerationFailed(String),

    #[error("Audio decode failed: {0}")]
    DecodeFailed(String),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(AudioFormat),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Timeout error: {0}")]
    TimeoutError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for TTS operations
pub type TTSResult<T> = Result<T, TTSError>;

/// Audio encoding sent to the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    #[default]
    Pcm,
    Opus,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Pcm => "pcm",
            AudioFormat::Opus => "opus",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pcm" | "linear16" => Ok(AudioFormat::Pcm),
            "opus" => Ok(AudioFormat::Opus),
            other => Err(format!("Unsupported audio format: {other}")),
        }
    }
}

/// Where a synthesized artifact lives until it is decoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Transient file written by the synthesizer
    File(PathBuf),
    /// Raw 16-bit little-endian mono PCM held in memory
    Buffer(Bytes),
}

/// Output of one synthesis call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedAudio {
    pub source: AudioSource,
    pub sample_rate: u32,
}

impl SynthesizedAudio {
    pub fn from_buffer(data: impl Into<Bytes>, sample_rate: u32) -> Self {
        Self {
            source: AudioSource::Buffer(data.into()),
            sample_rate,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>, sample_rate: u32) -> Self {
        Self {
            source: AudioSource::File(path.into()),
            sample_rate,
        }
    }
}

/// Base trait for speech-synthesis backends
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Prepare any per-session connection. Called once when the session
    /// becomes active.
    async fn open_channel(&self, _session_id: &str) -> TTSResult<()> {
        Ok(())
    }

    /// Synthesize one segment.
    ///
    /// Returns `Ok(None)` when the backend produced nothing for this text.
    async fn synthesize(&self, text: &str) -> TTSResult<Option<SynthesizedAudio>>;

    /// Decode an artifact into wire frames.
    ///
    /// This is blocking work and is run off the async executor.
    fn decode(&self, audio: &SynthesizedAudio, format: AudioFormat) -> TTSResult<Vec<Bytes>>;

    /// Wire formats `decode` can produce
    fn supports_format(&self, _format: AudioFormat) -> bool {
        true
    }

    /// Whether artifacts returned by `synthesize` are transient files this
    /// backend expects the caller to delete after decoding.
    fn owns_transient_files(&self) -> bool {
        false
    }

    /// Release an artifact. Removes the backing file for file artifacts.
    fn discard(&self, audio: &SynthesizedAudio) {
        if let AudioSource::File(path) = &audio.source
            && let Err(e) = std::fs::remove_file(path)
        {
            warn!("Failed to remove synthesis artifact {}: {}", path.display(), e);
        }
    }

    /// Close the backend. Must be safe to call more than once.
    async fn close(&self) -> TTSResult<()> {
        Ok(())
    }

    fn provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "unknown",
            "version": "1.0.0"
        })
    }
}

/// Split a PCM buffer into fixed-duration frames.
///
/// The last frame may be shorter.
pub fn frame_pcm(data: &[u8], sample_rate: u32, frame_ms: u32) -> Vec<Bytes> {
    let frame_bytes = (sample_rate as usize * frame_ms as usize / 1000) * 2;
    if frame_bytes == 0 {
        return vec![Bytes::copy_from_slice(data)];
    }
    data.chunks(frame_bytes)
        .map(Bytes::copy_from_slice)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FileTTS;

    #[async_trait]
    impl Synthesizer for FileTTS {
        async fn synthesize(&self, _text: &str) -> TTSResult<Option<SynthesizedAudio>> {
            Ok(None)
        }

        fn decode(&self, _audio: &SynthesizedAudio, format: AudioFormat) -> TTSResult<Vec<Bytes>> {
            Err(TTSError::UnsupportedFormat(format))
        }
    }

    #[test]
    fn test_audio_format_parsing() {
        assert_eq!("pcm".parse::<AudioFormat>().unwrap(), AudioFormat::Pcm);
        assert_eq!("OPUS".parse::<AudioFormat>().unwrap(), AudioFormat::Opus);
        assert_eq!("linear16".parse::<AudioFormat>().unwrap(), AudioFormat::Pcm);
        assert!("mp3".parse::<AudioFormat>().is_err());
    }

    #[test]
    fn test_audio_format_serde() {
        let json = serde_json::to_string(&AudioFormat::Opus).unwrap();
        assert_eq!(json, "\"opus\"");
    }

    #[test]
    fn test_frame_pcm_splits_on_frame_boundary() {
        // 60 ms at 16 kHz mono 16-bit is 1920 bytes
        let data = vec![0u8; 1920 * 2 + 100];
        let frames = frame_pcm(&data, 16000, 60);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 1920);
        assert_eq!(frames[2].len(), 100);
    }

    #[test]
    fn test_default_discard_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("segment.pcm");
        std::fs::write(&path, [0u8; 16]).unwrap();

        let tts = FileTTS;
        tts.discard(&SynthesizedAudio::from_file(&path, 16000));
        assert!(!path.exists());

        // A second discard logs and moves on
        tts.discard(&SynthesizedAudio::from_file(&path, 16000));
    }

    #[tokio::test]
    async fn test_default_lifecycle_is_noop() {
        let tts = FileTTS;
        tts.open_channel("session").await.unwrap();
        tts.close().await.unwrap();
        tts.close().await.unwrap();
        assert_eq!(tts.provider_info()["provider"], "unknown");
    }
}
