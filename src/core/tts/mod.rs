pub mod base;
mod silent;

pub use base::{
    AudioFormat, AudioSource, FRAME_DURATION_MS, SynthesizedAudio, Synthesizer, TTSError,
    TTSResult, WIRE_SAMPLE_RATE, frame_pcm,
};
pub use silent::SilentSynthesizer;
