//! # WebSocket Voice Session Handler
//!
//! One WebSocket connection is one device session. Binary frames carry audio
//! in both directions; text frames carry JSON control and status messages.
//!
//! ## Connection Flow
//! 1. Device connects to `/ws` with `device-id` and `client-id` headers
//!    (or query parameters of the same names)
//! 2. The device is authenticated before the upgrade; failures get HTTP 401
//! 3. The session is provisioned; provisioning failures put it in
//!    needs-binding mode instead of refusing the connection
//! 4. Audio frames go to the recognizer; transcripts and `listen` messages
//!    start turns whose audio streams back as binary frames
//! 5. The session ends when the device disconnects or stays idle too long
//!
//! ## Message Types
//!
//! **Incoming Messages:**
//! - `{"type": "hello"}` - Request session parameters
//! - `{"type": "listen", "state": "detect", "text": "what time is it"}` - Start a turn from text
//! - `{"type": "abort"}` - Barge-in: drop the audio of the current turn
//! - `{"type": "server", "action": "restart"}` - Restart the server process
//! - **Binary messages** - Raw audio for the recognizer
//!
//! **Outgoing Messages:**
//! - `{"type": "hello", "session_id": "...", "transport": "websocket", "audio_params": {...}}`
//! - `{"type": "tts", "state": "start", "session_id": "..."}` - A response begins
//! - `{"type": "tts", "state": "sentence_start", "text": "...", "index": 0, "session_id": "..."}` -
//!   Audio for this sentence follows
//! - `{"type": "tts", "state": "stop", "session_id": "..."}` - All audio for the response was sent
//! - `{"type": "stt", "text": "...", "session_id": "..."}` - Recognized utterance
//! - `{"type": "server", "status": "success", "message": "...", "content": {"action": "restart"}}`
//! - `{"type": "error", "message": "..."}` - Invalid inbound message; the connection stays open
//! - **Binary messages** - Synthesized audio frames, in sentence order

mod error;
mod handler;
mod identity;
mod messages;


pub use error::{WebSocketError, WebSocketResult};
pub use handler::ws_voice_handler;
pub use identity::{IdentityQuery, MISSING_IDENTITY_HINT, client_ip, resolve_identity};
pub use messages::{
    AudioParams, IncomingMessage, ListenState, MessageRoute, OutgoingMessage, ServerStatus,
    TtsState,
};
