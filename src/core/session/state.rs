//! Concurrency-safe pieces of session state
//!
//! Everything here is shared between the connection task, the pipeline
//! consumers and the watchdog, so each type is a thin handle over an atomic
//! or a watch channel and is cheap to clone.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Lifecycle phase of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Connecting = 0,
    Authenticated = 1,
    Active = 2,
    Closing = 3,
    Closed = 4,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Connecting,
            1 => Phase::Authenticated,
            2 => Phase::Active,
            3 => Phase::Closing,
            _ => Phase::Closed,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Connecting => "connecting",
            Phase::Authenticated => "authenticated",
            Phase::Active => "active",
            Phase::Closing => "closing",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Session phase with forward-only transitions
#[derive(Debug)]
pub struct SessionState {
    phase: AtomicU8,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: AtomicU8::new(Phase::Connecting as u8),
        }
    }

    pub fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// Move to `next` if it is later than the current phase.
    ///
    /// Returns the phase that was replaced, or `None` when the transition
    /// would go backwards.
    pub fn advance(&self, next: Phase) -> Option<Phase> {
        let mut current = self.phase.load(Ordering::Acquire);
        loop {
            if current >= next as u8 {
                return None;
            }
            match self.phase.compare_exchange(
                current,
                next as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(previous) => return Some(Phase::from_u8(previous)),
                Err(actual) => current = actual,
            }
        }
    }

    pub fn is_closing(&self) -> bool {
        self.phase() >= Phase::Closing
    }
}

impl PartialOrd for Phase {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Phase {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

/// Barge-in flag shared by the turn loop and the pipeline consumers
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Time of the last inbound activity
#[derive(Debug, Clone)]
pub struct ActivityClock {
    base: Instant,
    last_ms: Arc<AtomicU64>,
}

impl Default for ActivityClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record activity now
    pub fn touch(&self) {
        let elapsed = self.base.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(elapsed, Ordering::AcqRel);
    }

    /// Time since the last recorded activity
    pub fn idle_for(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Acquire));
        self.base.elapsed().saturating_sub(last)
    }
}

/// Tracks which turn's end marker the playback consumer has delivered.
///
/// A new turn waits here until the previous turn has fully drained, so the
/// audio of two turns never interleaves.
#[derive(Debug, Clone)]
pub struct TurnGate {
    tx: Arc<watch::Sender<u64>>,
}

impl Default for TurnGate {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx) }
    }

    /// Mark turn `seq` as delivered
    pub fn complete(&self, seq: u64) {
        self.tx.send_if_modified(|current| {
            if seq > *current {
                *current = seq;
                true
            } else {
                false
            }
        });
    }

    /// Let every waiter through. Used on shutdown.
    pub fn release(&self) {
        self.complete(u64::MAX);
    }

    pub fn completed(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Wait until turn `seq` has been delivered
    pub async fn wait_for(&self, seq: u64) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|completed| *completed >= seq).await;
    }
}
