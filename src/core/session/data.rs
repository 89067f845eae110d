use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;
use tracing::warn;
use uuid::Uuid;

use super::config::SessionConfig;
use super::state::{AbortFlag, ActivityClock, SessionState, TurnGate};
use crate::core::dialogue::Dialogue;
use crate::core::provisioning::{Capabilities, DeviceIdentity, Provisioner};
use crate::core::tools::{JsonToolCallRecovery, ToolCallRecovery};

/// Whether the device finished provisioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Bound,
    /// Provisioning failed; turns are answered with a bind prompt
    NeedsBinding { bind_code: Option<String> },
}

impl Binding {
    pub fn needs_binding(&self) -> bool {
        matches!(self, Binding::NeedsBinding { .. })
    }
}

/// Shared state of one connection.
///
/// Identity, configuration and collaborators are fixed at creation. The
/// dialogue is only mutated by the turn loop, which holds its lock for the
/// whole turn; the remaining fields are atomics shared with the pipeline and
/// the watchdog.
pub struct Session {
    pub id: String,
    pub device: DeviceIdentity,
    pub config: SessionConfig,
    pub capabilities: Capabilities,
    pub binding: Binding,
    pub recovery: Arc<dyn ToolCallRecovery>,
    pub(crate) dialogue: Mutex<Dialogue>,
    pub abort: AbortFlag,
    pub activity: ActivityClock,
    pub state: SessionState,
    pub gate: TurnGate,
    turn_seq: AtomicU64,
    /// Identifier of the latest top-level turn
    current_turn: parking_lot::Mutex<Option<String>>,
}

impl Session {
    pub fn new(
        device: DeviceIdentity,
        config: SessionConfig,
        capabilities: Capabilities,
        binding: Binding,
    ) -> Self {
        let dialogue = Dialogue::new(capabilities.system_prompt.clone());
        Self {
            id: Uuid::new_v4().to_string(),
            device,
            config,
            capabilities,
            binding,
            recovery: Arc::new(JsonToolCallRecovery),
            dialogue: Mutex::new(dialogue),
            abort: AbortFlag::new(),
            activity: ActivityClock::new(),
            state: SessionState::new(),
            gate: TurnGate::new(),
            turn_seq: AtomicU64::new(0),
            current_turn: parking_lot::Mutex::new(None),
        }
    }

    /// Resolve capabilities for `device` and build the session.
    ///
    /// Provisioning failures never fail the connection: the session falls
    /// back to the default capabilities in needs-binding mode.
    pub async fn provision(
        device: DeviceIdentity,
        config: SessionConfig,
        provisioner: &dyn Provisioner,
    ) -> Self {
        match provisioner.provision(&device).await {
            Ok(capabilities) => Self::new(device, config, capabilities, Binding::Bound),
            Err(e) => {
                warn!(device_id = %device.device_id, "Provisioning failed, binding required: {}", e);
                let bind_code = e.bind_code().map(str::to_string);
                Self::new(
                    device,
                    config,
                    provisioner.defaults(),
                    Binding::NeedsBinding { bind_code },
                )
            }
        }
    }

    /// Replace the tool-call recovery strategy
    pub fn with_recovery(mut self, recovery: Arc<dyn ToolCallRecovery>) -> Self {
        self.recovery = recovery;
        self
    }

    /// Sequence number for the next top-level turn, starting at 1
    pub(crate) fn next_turn_seq(&self) -> u64 {
        self.turn_seq.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Identifier of the turn currently running, or of the last one that ran
    pub fn current_turn_id(&self) -> Option<String> {
        self.current_turn.lock().clone()
    }

    pub(crate) fn set_current_turn(&self, turn_id: &str) {
        *self.current_turn.lock() = Some(turn_id.to_string());
    }

    /// Copy of the dialogue history
    pub async fn dialogue_snapshot(&self) -> Dialogue {
        self.dialogue.lock().await.clone()
    }
}
