//! Configuration types for a session

use std::time::Duration;

use crate::core::segmenter::DEFAULT_SEGMENT_THRESHOLD;
use crate::core::tts::AudioFormat;

/// Per-connection settings handed to the session core
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Close the session after this long without inbound activity
    pub idle_timeout: Duration,
    /// How often the watchdog checks for idleness
    pub watchdog_interval: Duration,
    /// Maximum wait for one segment's synthesis result
    pub synthesis_timeout: Duration,
    /// Forced-split length for unpunctuated text, in characters
    pub segment_threshold: usize,
    /// Maximum number of tool round trips per turn
    pub max_tool_depth: usize,
    /// Concurrent synthesis jobs per session
    pub synthesis_workers: usize,
    /// Encoding of outbound audio frames
    pub audio_format: AudioFormat,
    /// Forward spoken segments to the report sink
    pub report_enabled: bool,
    /// Capacity of each pipeline queue
    pub queue_size: usize,
    /// Upper bound on how long a new turn waits for the previous one to drain
    pub turn_drain_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(180), // 120s without voice + 60s grace
            watchdog_interval: Duration::from_secs(10),
            synthesis_timeout: Duration::from_secs(10),
            segment_threshold: DEFAULT_SEGMENT_THRESHOLD,
            max_tool_depth: 5,
            synthesis_workers: 10,
            audio_format: AudioFormat::Pcm,
            report_enabled: false,
            queue_size: 64,
            turn_drain_timeout: Duration::from_secs(30),
        }
    }
}
