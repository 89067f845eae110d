use bytes::Bytes;

/// Outbound events produced by a session.
///
/// The connection handler turns these into protocol frames. Events for one
/// turn are emitted in playback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A response is about to start
    TurnStarted { turn_id: String },
    /// Audio for segment `index` follows; `is_last` marks the turn's final segment
    SentenceStarted {
        index: u32,
        text: String,
        is_last: bool,
    },
    /// One encoded audio frame
    Audio(Bytes),
    /// All audio for the turn has been sent
    TurnStopped { turn_id: String },
    /// The recognizer finished an utterance
    Transcript { text: String },
    /// The session is closing; the connection should be closed
    Close,
}

/// Pipeline marker bracketing a turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnMarker {
    Start { turn_id: String },
    End { turn_id: String, seq: u64 },
}
