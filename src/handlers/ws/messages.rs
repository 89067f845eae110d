//! WebSocket message types and routing
//!
//! Incoming control messages, outgoing status messages, and the mapping from
//! session events onto the wire.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::core::session::SessionEvent;
use crate::core::tts::{AudioFormat, FRAME_DURATION_MS, WIRE_SAMPLE_RATE};

/// Transport name reported in the hello response
pub const TRANSPORT: &str = "websocket";

/// Listening state reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenState {
    Start,
    Stop,
    /// Text was detected on the device (wake word or typed input)
    Detect,
    #[serde(other)]
    Unknown,
}

/// WebSocket message types for incoming messages
#[derive(Debug, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IncomingMessage {
    Hello,
    Listen {
        state: ListenState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Abort,
    Server {
        action: String,
    },
}

/// Audio parameters announced to the device
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AudioParams {
    pub format: AudioFormat,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration: u32,
}

impl AudioParams {
    pub fn for_format(format: AudioFormat) -> Self {
        Self {
            format,
            sample_rate: WIRE_SAMPLE_RATE,
            channels: 1,
            frame_duration: FRAME_DURATION_MS,
        }
    }
}

/// Synthesis state carried by `tts` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    SentenceStart,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerContent {
    pub action: String,
}

/// WebSocket message types for outgoing messages
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutgoingMessage {
    Hello {
        session_id: String,
        transport: &'static str,
        audio_params: AudioParams,
    },
    Tts {
        state: TtsState,
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        index: Option<u32>,
    },
    Stt {
        text: String,
        session_id: String,
    },
    Server {
        status: ServerStatus,
        message: String,
        content: ServerContent,
    },
    Error {
        message: String,
    },
}

impl OutgoingMessage {
    /// Acknowledgment for a `server` action
    pub fn server_ack(status: ServerStatus, message: impl Into<String>, action: &str) -> Self {
        OutgoingMessage::Server {
            status,
            message: message.into(),
            content: ServerContent {
                action: action.to_string(),
            },
        }
    }

    fn tts(state: TtsState, session_id: &str) -> Self {
        OutgoingMessage::Tts {
            state,
            session_id: session_id.to_string(),
            text: None,
            index: None,
        }
    }
}

/// Message routing for the sender task
#[derive(Debug)]
pub enum MessageRoute {
    Outgoing(OutgoingMessage),
    Binary(Bytes),
    /// Send a close frame and stop
    Close,
}

impl MessageRoute {
    /// Wire representation of a session event
    pub fn from_session_event(event: SessionEvent, session_id: &str) -> Self {
        match event {
            SessionEvent::TurnStarted { .. } => {
                MessageRoute::Outgoing(OutgoingMessage::tts(TtsState::Start, session_id))
            }
            SessionEvent::SentenceStarted { index, text, .. } => {
                MessageRoute::Outgoing(OutgoingMessage::Tts {
                    state: TtsState::SentenceStart,
                    session_id: session_id.to_string(),
                    text: Some(text),
                    index: Some(index),
                })
            }
            SessionEvent::Audio(data) => MessageRoute::Binary(data),
            SessionEvent::TurnStopped { .. } => {
                MessageRoute::Outgoing(OutgoingMessage::tts(TtsState::Stop, session_id))
            }
            SessionEvent::Transcript { text } => MessageRoute::Outgoing(OutgoingMessage::Stt {
                text,
                session_id: session_id.to_string(),
            }),
            SessionEvent::Close => MessageRoute::Close,
        }
    }
}
