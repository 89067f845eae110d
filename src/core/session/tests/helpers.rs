use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::stubs::{
    ChannelRecognizer, EchoSynthesizer, RecordingMemory, ScriptedModel, ScriptedRemote,
    ScriptedToolbox,
};
use crate::core::provisioning::{Capabilities, DeviceIdentity};
use crate::core::report::Reporter;
use crate::core::session::{
    Binding, Session, SessionConfig, SessionEvent, TurnOutcome, run_turn,
};
use crate::core::synthesis::{PipelineContext, SynthesisPipeline};

/// Every collaborator of a test session, kept for later inspection
pub struct Collaborators {
    pub model: Arc<ScriptedModel>,
    pub tools: Arc<ScriptedToolbox>,
    pub remote: Arc<ScriptedRemote>,
    pub memory: Arc<RecordingMemory>,
    pub synthesizer: Arc<EchoSynthesizer>,
    pub recognizer: Arc<ChannelRecognizer>,
    pub system_prompt: Option<String>,
}

impl Collaborators {
    pub fn new(model: ScriptedModel) -> Self {
        Self {
            model: Arc::new(model),
            tools: Arc::new(ScriptedToolbox::default()),
            remote: Arc::new(ScriptedRemote::default()),
            memory: Arc::new(RecordingMemory::default()),
            synthesizer: Arc::new(EchoSynthesizer::default()),
            recognizer: Arc::new(ChannelRecognizer::default()),
            system_prompt: None,
        }
    }

    pub fn with_tools(mut self, tools: ScriptedToolbox) -> Self {
        self.tools = Arc::new(tools);
        self
    }

    pub fn with_remote(mut self, remote: ScriptedRemote) -> Self {
        self.remote = Arc::new(remote);
        self
    }

    pub fn with_memory(mut self, memory: RecordingMemory) -> Self {
        self.memory = Arc::new(memory);
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: EchoSynthesizer) -> Self {
        self.synthesizer = Arc::new(synthesizer);
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            recognizer: self.recognizer.clone(),
            synthesizer: self.synthesizer.clone(),
            model: self.model.clone(),
            memory: self.memory.clone(),
            tools: self.tools.clone(),
            remote_tools: self.remote.clone(),
            system_prompt: self.system_prompt.clone(),
        }
    }
}

pub fn device() -> DeviceIdentity {
    DeviceIdentity {
        device_id: "00:11:22:33:44:55".to_string(),
        client_id: Some("client-1".to_string()),
        client_ip: "127.0.0.1".to_string(),
    }
}

pub fn test_config() -> SessionConfig {
    SessionConfig {
        idle_timeout: Duration::from_secs(30),
        watchdog_interval: Duration::from_secs(10),
        synthesis_timeout: Duration::from_secs(5),
        turn_drain_timeout: Duration::from_secs(5),
        ..SessionConfig::default()
    }
}

/// Session plus pipeline, driving `run_turn` directly
pub struct TurnHarness {
    pub session: Arc<Session>,
    pub pipeline: SynthesisPipeline,
    pub events: mpsc::Receiver<SessionEvent>,
}

impl TurnHarness {
    pub fn new(collaborators: &Collaborators) -> Self {
        Self::with_binding(collaborators, test_config(), Binding::Bound)
    }

    pub fn with_binding(
        collaborators: &Collaborators,
        config: SessionConfig,
        binding: Binding,
    ) -> Self {
        let session = Arc::new(Session::new(
            device(),
            config,
            collaborators.capabilities(),
            binding,
        ));
        let (events_tx, events) = mpsc::channel(1024);
        let pipeline = SynthesisPipeline::start(PipelineContext {
            session_id: session.id.clone(),
            device_id: session.device.device_id.clone(),
            synthesizer: session.capabilities.synthesizer.clone(),
            audio_format: session.config.audio_format,
            synthesis_timeout: session.config.synthesis_timeout,
            workers: session.config.synthesis_workers,
            queue_size: session.config.queue_size,
            abort: session.abort.clone(),
            gate: session.gate.clone(),
            events: events_tx,
            reporter: Arc::new(Reporter::disabled()),
        });
        Self {
            session,
            pipeline,
            events,
        }
    }

    /// Run a turn and collect its events through the end marker
    pub async fn run(&mut self, input: &str) -> (TurnOutcome, Vec<SessionEvent>) {
        let outcome = run_turn(&self.session, &self.pipeline, input.to_string()).await;
        let events = collect_turn(&mut self.events).await;
        (outcome, events)
    }
}

/// Events up to and including the next `TurnStopped`
pub async fn collect_turn(events: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut out = Vec::new();
    while let Some(event) = events.recv().await {
        let done = matches!(event, SessionEvent::TurnStopped { .. });
        out.push(event);
        if done {
            break;
        }
    }
    out
}

/// Segment texts announced in `events`, in order
pub fn spoken(events: &[SessionEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            SessionEvent::SentenceStarted { text, .. } => Some(text.clone()),
            _ => None,
        })
        .collect()
}
