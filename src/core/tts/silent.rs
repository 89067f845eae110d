use async_trait::async_trait;
use bytes::Bytes;

use super::base::{
    AudioFormat, AudioSource, FRAME_DURATION_MS, SynthesizedAudio, Synthesizer, TTSError,
    TTSResult, WIRE_SAMPLE_RATE, frame_pcm,
};

/// Milliseconds of audio produced per character of input
const MS_PER_CHAR: usize = 60;

/// Synthesizer that produces silence sized to the input text.
///
/// Used when no speech backend is configured: clients still receive the full
/// turn framing and correctly paced audio frames.
#[derive(Debug, Clone, Default)]
pub struct SilentSynthesizer;

impl SilentSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Synthesizer for SilentSynthesizer {
    async fn synthesize(&self, text: &str) -> TTSResult<Option<SynthesizedAudio>> {
        let chars = text.chars().filter(|c| !c.is_whitespace()).count();
        if chars == 0 {
            return Ok(None);
        }

        let samples = WIRE_SAMPLE_RATE as usize * chars * MS_PER_CHAR / 1000;
        Ok(Some(SynthesizedAudio::from_buffer(
            vec![0u8; samples * 2],
            WIRE_SAMPLE_RATE,
        )))
    }

    fn supports_format(&self, format: AudioFormat) -> bool {
        format == AudioFormat::Pcm
    }

    fn decode(&self, audio: &SynthesizedAudio, format: AudioFormat) -> TTSResult<Vec<Bytes>> {
        if !self.supports_format(format) {
            return Err(TTSError::UnsupportedFormat(format));
        }
        match &audio.source {
            AudioSource::Buffer(data) => Ok(frame_pcm(data, audio.sample_rate, FRAME_DURATION_MS)),
            AudioSource::File(path) => {
                let data = std::fs::read(path).map_err(|e| {
                    TTSError::DecodeFailed(format!("{}: {}", path.display(), e))
                })?;
                Ok(frame_pcm(&data, audio.sample_rate, FRAME_DURATION_MS))
            }
        }
    }

    fn provider_info(&self) -> serde_json::Value {
        serde_json::json!({
            "provider": "silent",
            "version": "1.0.0",
            "supported_formats": ["pcm"]
        })
    }
}
