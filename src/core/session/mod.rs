//! # Session
//!
//! Per-connection orchestration: the [`Session`] data container, the turn
//! loop that drives the model and tools, and the [`SessionRuntime`] that owns
//! the synthesis pipeline, the idle watchdog and teardown.

pub mod config;
mod data;
pub mod errors;
pub mod events;
mod lifecycle;
pub mod state;
mod turn;

#[cfg(test)]
mod tests;

pub use config::SessionConfig;
pub use data::{Binding, Session};
pub use errors::{SessionError, SessionResult};
pub use events::{SessionEvent, TurnMarker};
pub use lifecycle::SessionRuntime;
pub use state::{AbortFlag, ActivityClock, Phase, SessionState, TurnGate};
pub use turn::{TurnOutcome, run_turn};
