//! Session lifecycle: activation, idle watchdog, barge-in and teardown

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::data::Session;
use super::events::SessionEvent;
use super::state::Phase;
use super::turn::{TurnOutcome, run_turn};
use crate::core::report::{ReportSink, Reporter};
use crate::core::stt::RecognizerEvent;
use crate::core::synthesis::{PipelineContext, SynthesisPipeline};

const RECOGNIZER_EVENT_BUFFER: usize = 256;

/// Running session: owns the pipeline, the watchdog and in-flight turns.
pub struct SessionRuntime {
    session: Arc<Session>,
    pipeline: Arc<SynthesisPipeline>,
    reporter: Arc<Reporter>,
    events: mpsc::Sender<SessionEvent>,
    /// Cancelled when the session starts closing
    shutdown: CancellationToken,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    /// Submitted turns, run one at a time in arrival order
    turn_tx: mpsc::UnboundedSender<String>,
    turn_worker: Mutex<Option<JoinHandle<()>>>,
    /// Turns submitted but not finished yet
    pending_turns: Arc<watch::Sender<usize>>,
    outcomes: Arc<Mutex<Vec<TurnOutcome>>>,
    closed: AtomicBool,
}

impl SessionRuntime {
    /// Activate `session`.
    ///
    /// Starts the pipeline consumers and the watchdog right away; the
    /// recognizer and synthesizer channels are opened in the background so
    /// the connection can accept messages immediately.
    pub fn start(
        session: Session,
        events: mpsc::Sender<SessionEvent>,
        report_sink: Arc<dyn ReportSink>,
    ) -> Arc<Self> {
        let session = Arc::new(session);
        session.state.advance(Phase::Authenticated);

        let reporter = Arc::new(if session.config.report_enabled {
            Reporter::spawn(report_sink)
        } else {
            Reporter::disabled()
        });

        let pipeline = Arc::new(SynthesisPipeline::start(PipelineContext {
            session_id: session.id.clone(),
            device_id: session.device.device_id.clone(),
            synthesizer: session.capabilities.synthesizer.clone(),
            audio_format: session.config.audio_format,
            synthesis_timeout: session.config.synthesis_timeout,
            workers: session.config.synthesis_workers,
            queue_size: session.config.queue_size,
            abort: session.abort.clone(),
            gate: session.gate.clone(),
            events: events.clone(),
            reporter: reporter.clone(),
        }));

        let shutdown = CancellationToken::new();
        let (turn_tx, turn_rx) = mpsc::unbounded_channel();
        let pending_turns = Arc::new(watch::Sender::new(0usize));
        let outcomes = Arc::new(Mutex::new(Vec::new()));
        let turn_worker = tokio::spawn(Self::run_turn_worker(
            session.clone(),
            pipeline.clone(),
            turn_rx,
            pending_turns.clone(),
            outcomes.clone(),
            shutdown.clone(),
        ));

        let runtime = Arc::new(Self {
            session: session.clone(),
            pipeline,
            reporter,
            events,
            shutdown,
            watchdog: Mutex::new(None),
            listener: Mutex::new(None),
            turn_tx,
            turn_worker: Mutex::new(Some(turn_worker)),
            pending_turns,
            outcomes,
            closed: AtomicBool::new(false),
        });

        session.activity.touch();
        session.state.advance(Phase::Active);

        let watchdog = tokio::spawn(Self::run_watchdog(
            Arc::downgrade(&runtime),
            session.config.idle_timeout,
            session.config.watchdog_interval,
            runtime.shutdown.clone(),
        ));
        *runtime.watchdog.lock() = Some(watchdog);

        let (event_tx, event_rx) = mpsc::channel(RECOGNIZER_EVENT_BUFFER);
        let listener = tokio::spawn(Self::run_recognizer_listener(
            Arc::downgrade(&runtime),
            event_rx,
            runtime.shutdown.clone(),
        ));
        *runtime.listener.lock() = Some(listener);

        tokio::spawn(Self::open_channels(session.clone(), event_tx));

        info!(
            session_id = %session.id,
            device_id = %session.device.device_id,
            needs_binding = session.binding.needs_binding(),
            "Session active"
        );
        runtime
    }

    async fn open_channels(session: Arc<Session>, events: mpsc::Sender<RecognizerEvent>) {
        let caps = &session.capabilities;
        if let Err(e) = caps.synthesizer.open_channel(&session.id).await {
            warn!(session_id = %session.id, "Failed to open synthesizer channel: {}", e);
        }
        if let Err(e) = caps.recognizer.open_channel(&session.id, events).await {
            warn!(session_id = %session.id, "Failed to open recognizer channel: {}", e);
        }
    }

    /// Run submitted turns strictly in the order they arrived
    async fn run_turn_worker(
        session: Arc<Session>,
        pipeline: Arc<SynthesisPipeline>,
        mut turns: mpsc::UnboundedReceiver<String>,
        pending: Arc<watch::Sender<usize>>,
        outcomes: Arc<Mutex<Vec<TurnOutcome>>>,
        token: CancellationToken,
    ) {
        loop {
            let input = tokio::select! {
                _ = token.cancelled() => break,
                input = turns.recv() => match input {
                    Some(input) => input,
                    None => break,
                },
            };

            let outcome = run_turn(&session, &pipeline, input).await;
            outcomes.lock().push(outcome);
            pending.send_modify(|n| *n = n.saturating_sub(1));
        }
        debug!(session_id = %session.id, "Turn worker stopped");
    }

    async fn run_watchdog(
        runtime: Weak<Self>,
        idle_timeout: Duration,
        interval: Duration,
        token: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let Some(runtime) = runtime.upgrade() else {
                break;
            };
            let idle = runtime.session.activity.idle_for();
            if idle >= idle_timeout {
                info!(
                    session_id = %runtime.session.id,
                    "No activity for {:?}, closing session", idle
                );
                // Close from its own task: close() tears down this watchdog.
                tokio::spawn(async move { runtime.close().await });
                break;
            }
        }
        debug!("Watchdog stopped");
    }

    async fn run_recognizer_listener(
        runtime: Weak<Self>,
        mut events: mpsc::Receiver<RecognizerEvent>,
        token: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                _ = token.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let Some(runtime) = runtime.upgrade() else {
                break;
            };
            runtime.touch();
            match event {
                RecognizerEvent::VoiceActivity => runtime.abort(),
                RecognizerEvent::Transcript { text } => {
                    let text = text.trim().to_string();
                    if text.is_empty() {
                        continue;
                    }
                    if runtime
                        .events
                        .send(SessionEvent::Transcript { text: text.clone() })
                        .await
                        .is_err()
                    {
                        break;
                    }
                    runtime.submit_turn(text);
                }
            }
        }
        debug!("Recognizer listener stopped");
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn id(&self) -> &str {
        &self.session.id
    }

    /// Token cancelled once the session starts closing
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Record inbound activity, postponing the idle timeout
    pub fn touch(&self) {
        self.session.activity.touch();
    }

    /// Barge-in: stop producing audio for the current turn
    pub fn abort(&self) {
        debug!(session_id = %self.session.id, "Abort requested");
        self.session.abort.set();
    }

    /// Forward inbound audio to the recognizer
    pub async fn send_audio(&self, audio: bytes::Bytes) {
        if let Err(e) = self.session.capabilities.recognizer.send_audio(audio).await {
            warn!(session_id = %self.session.id, "Recognizer rejected audio: {}", e);
        }
    }

    /// Queue a new top-level turn. Returns false once the session is closing.
    pub fn submit_turn(&self, text: String) -> bool {
        if self.session.state.is_closing() {
            return false;
        }

        self.pending_turns.send_modify(|n| *n += 1);
        if self.turn_tx.send(text).is_err() {
            self.pending_turns.send_modify(|n| *n = n.saturating_sub(1));
            return false;
        }
        true
    }

    /// Wait until every submitted turn has finished and return their
    /// outcomes in submission order. Turns cut off by close are not reported.
    pub async fn wait_idle(&self) -> Vec<TurnOutcome> {
        let mut pending = self.pending_turns.subscribe();
        // The sender lives as long as the runtime, so this cannot fail
        let _ = pending.wait_for(|n| *n == 0).await;
        std::mem::take(&mut *self.outcomes.lock())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Tear the session down.
    ///
    /// Runs at most once; later calls return immediately. Each step handles
    /// its own failure so the remaining steps always run.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let session = &self.session;
        session.state.advance(Phase::Closing);
        info!(session_id = %session.id, "Closing session");

        self.shutdown.cancel();
        if let Some(watchdog) = self.watchdog.lock().take() {
            watchdog.abort();
        }

        session.abort.set();
        if let Some(worker) = self.turn_worker.lock().take() {
            worker.abort();
        }
        self.pending_turns.send_replace(0);
        if let Some(listener) = self.listener.lock().take() {
            listener.abort();
        }

        let caps = &session.capabilities;
        if let Err(e) = caps.tools.cleanup().await {
            warn!(session_id = %session.id, "Tool cleanup failed: {}", e);
        }
        if let Err(e) = caps.remote_tools.cleanup().await {
            warn!(session_id = %session.id, "Remote tool cleanup failed: {}", e);
        }

        self.save_memory();

        self.pipeline.shutdown().await;

        if self.events.try_send(SessionEvent::Close).is_err() {
            debug!(session_id = %session.id, "Outbound channel already closed");
        }

        if let Err(e) = caps.synthesizer.close().await {
            warn!(session_id = %session.id, "Synthesizer close failed: {}", e);
        }
        if let Err(e) = caps.recognizer.close().await {
            warn!(session_id = %session.id, "Recognizer close failed: {}", e);
        }

        self.reporter.shutdown().await;

        session.state.advance(Phase::Closed);
        info!(session_id = %session.id, "Session closed");
    }

    /// Hand the dialogue to memory in the background
    fn save_memory(&self) {
        let session = self.session.clone();
        tokio::spawn(async move {
            // Aborted turns release the dialogue lock once their task is dropped.
            let dialogue = session.dialogue.lock().await.messages().to_vec();
            if dialogue.is_empty() {
                return;
            }
            match session.capabilities.memory.save(dialogue).await {
                Ok(()) => debug!(session_id = %session.id, "Dialogue saved to memory"),
                Err(e) => warn!(session_id = %session.id, "Failed to save dialogue: {}", e),
            }
        });
    }
}
