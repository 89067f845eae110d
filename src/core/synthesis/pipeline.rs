use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::report::{ReportRecord, Reporter};
use crate::core::segmenter::Segment;
use crate::core::session::events::{SessionEvent, TurnMarker};
use crate::core::session::state::{AbortFlag, TurnGate};
use crate::core::session::{SessionError, SessionResult};
use crate::core::tts::{AudioFormat, SynthesizedAudio, Synthesizer, TTSResult};

type JobResult = TTSResult<Option<SynthesizedAudio>>;

/// Synthesis job waiting in submission order
struct SynthesisJob {
    index: u32,
    text: String,
    is_first: bool,
    is_last: bool,
    receiver: oneshot::Receiver<JobResult>,
}

enum SynthesisEntry {
    Marker(TurnMarker),
    Job(SynthesisJob),
}

/// Decoded audio ready to be sent
struct PlaybackItem {
    index: u32,
    text: String,
    is_first: bool,
    is_last: bool,
    frames: Vec<Bytes>,
}

enum PlaybackEntry {
    Marker(TurnMarker),
    Audio(PlaybackItem),
}

/// Everything the pipeline needs from its session
pub struct PipelineContext {
    pub session_id: String,
    pub device_id: String,
    pub synthesizer: Arc<dyn Synthesizer>,
    pub audio_format: AudioFormat,
    pub synthesis_timeout: Duration,
    pub workers: usize,
    pub queue_size: usize,
    pub abort: AbortFlag,
    pub gate: TurnGate,
    pub events: mpsc::Sender<SessionEvent>,
    pub reporter: Arc<Reporter>,
}

/// Shared, read-only view used by the synthesis consumer
struct SynthesisContext {
    synthesizer: Arc<dyn Synthesizer>,
    audio_format: AudioFormat,
    synthesis_timeout: Duration,
    abort: AbortFlag,
}

/// Two-stage ordered synthesis pipeline.
///
/// Segments are synthesized concurrently, but a single synthesis consumer
/// awaits results strictly in submission order and a single playback
/// consumer sends them, so audio leaves in segment order no matter which job
/// finishes first.
pub struct SynthesisPipeline {
    session_id: String,
    synthesizer: Arc<dyn Synthesizer>,
    synthesis_tx: mpsc::Sender<SynthesisEntry>,
    workers: Arc<Semaphore>,
    gate: TurnGate,
    cancel_token: CancellationToken,
    synthesis_task: Mutex<Option<JoinHandle<()>>>,
    playback_task: Mutex<Option<JoinHandle<()>>>,
}

impl SynthesisPipeline {
    /// Spawn both consumers
    pub fn start(ctx: PipelineContext) -> Self {
        let queue_size = ctx.queue_size.max(1);
        let (synthesis_tx, synthesis_rx) = mpsc::channel(queue_size);
        let (playback_tx, playback_rx) = mpsc::channel(queue_size);
        let cancel_token = CancellationToken::new();

        let synthesis_ctx = SynthesisContext {
            synthesizer: ctx.synthesizer.clone(),
            audio_format: ctx.audio_format,
            synthesis_timeout: ctx.synthesis_timeout,
            abort: ctx.abort.clone(),
        };

        let synthesis_task = tokio::spawn(Self::run_synthesis_consumer(
            synthesis_ctx,
            synthesis_rx,
            playback_tx,
            cancel_token.clone(),
        ));

        let playback_task = tokio::spawn(Self::run_playback_consumer(
            ctx.session_id.clone(),
            ctx.device_id,
            playback_rx,
            ctx.events,
            ctx.abort,
            ctx.gate.clone(),
            ctx.reporter,
            cancel_token.clone(),
        ));

        Self {
            session_id: ctx.session_id,
            synthesizer: ctx.synthesizer,
            synthesis_tx,
            workers: Arc::new(Semaphore::new(ctx.workers.max(1))),
            gate: ctx.gate,
            cancel_token,
            synthesis_task: Mutex::new(Some(synthesis_task)),
            playback_task: Mutex::new(Some(playback_task)),
        }
    }

    /// Queue a turn marker behind everything already submitted
    pub async fn enqueue_marker(&self, marker: TurnMarker) -> SessionResult<()> {
        self.synthesis_tx
            .send(SynthesisEntry::Marker(marker))
            .await
            .map_err(|_| SessionError::PipelineClosed)
    }

    /// Start synthesis for `segment` and queue its pending result
    pub async fn enqueue_segment(&self, segment: &Segment) -> SessionResult<()> {
        if self.cancel_token.is_cancelled() {
            return Err(SessionError::PipelineClosed);
        }

        let receiver = self.spawn_job(segment.text.clone());
        let job = SynthesisJob {
            index: segment.index,
            text: segment.text.clone(),
            is_first: segment.is_first,
            is_last: segment.is_last,
            receiver,
        };

        debug!(
            session_id = %self.session_id,
            index = segment.index,
            "Queued segment for synthesis: {}",
            segment.text
        );

        self.synthesis_tx
            .send(SynthesisEntry::Job(job))
            .await
            .map_err(|_| SessionError::PipelineClosed)
    }

    /// Run one synthesis job on the worker pool.
    ///
    /// If the consumer has given up on the result by the time it is ready,
    /// the job releases the artifact itself.
    fn spawn_job(&self, text: String) -> oneshot::Receiver<JobResult> {
        let (tx, rx) = oneshot::channel();
        let synthesizer = self.synthesizer.clone();
        let workers = self.workers.clone();
        let token = self.cancel_token.clone();

        tokio::spawn(async move {
            let Ok(_permit) = workers.acquire_owned().await else {
                return;
            };
            let result = tokio::select! {
                _ = token.cancelled() => return,
                result = synthesizer.synthesize(&text) => result,
            };

            if let Err(Ok(Some(audio))) = tx.send(result) {
                debug!("Synthesis result arrived after its consumer gave up");
                if synthesizer.owns_transient_files() {
                    synthesizer.discard(&audio);
                }
            }
        });

        rx
    }

    async fn run_synthesis_consumer(
        ctx: SynthesisContext,
        mut rx: mpsc::Receiver<SynthesisEntry>,
        playback_tx: mpsc::Sender<PlaybackEntry>,
        token: CancellationToken,
    ) {
        debug!("Synthesis consumer started");

        loop {
            let entry = tokio::select! {
                _ = token.cancelled() => break,
                entry = rx.recv() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            let next = match entry {
                SynthesisEntry::Marker(marker) => Some(PlaybackEntry::Marker(marker)),
                SynthesisEntry::Job(job) => {
                    Self::resolve_job(&ctx, job).await.map(PlaybackEntry::Audio)
                }
            };

            if let Some(next) = next
                && !send_or_cancel(&playback_tx, next, &token).await
            {
                debug!("Playback queue closed or pipeline cancelled, stopping synthesis consumer");
                break;
            }
        }

        rx.close();
        let mut dropped = 0usize;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        debug!("Synthesis consumer exited, discarded {} queued entries", dropped);
    }

    /// Wait for one job and decode it. `None` means the segment is skipped.
    async fn resolve_job(ctx: &SynthesisContext, job: SynthesisJob) -> Option<PlaybackItem> {
        if ctx.abort.is_set() {
            debug!(index = job.index, "Abort set, dropping pending segment");
            return None;
        }

        let audio = match tokio::time::timeout(ctx.synthesis_timeout, job.receiver).await {
            Err(_) => {
                warn!(
                    index = job.index,
                    "Synthesis timed out after {:?}: {}", ctx.synthesis_timeout, job.text
                );
                return None;
            }
            Ok(Err(_)) => {
                warn!(index = job.index, "Synthesis job ended without a result");
                return None;
            }
            Ok(Ok(Err(e))) => {
                warn!(index = job.index, "Synthesis failed: {}", e);
                return None;
            }
            Ok(Ok(Ok(None))) => {
                debug!(index = job.index, "Synthesizer produced no audio");
                return None;
            }
            Ok(Ok(Ok(Some(audio)))) => audio,
        };

        let synthesizer = ctx.synthesizer.clone();
        if ctx.abort.is_set() {
            if synthesizer.owns_transient_files() {
                synthesizer.discard(&audio);
            }
            return None;
        }

        let format = ctx.audio_format;
        let decoded = tokio::task::spawn_blocking(move || {
            let frames = synthesizer.decode(&audio, format);
            if synthesizer.owns_transient_files() {
                synthesizer.discard(&audio);
            }
            frames
        })
        .await;

        let frames = match decoded {
            Ok(Ok(frames)) => frames,
            Ok(Err(e)) => {
                warn!(index = job.index, "Audio decode failed: {}", e);
                return None;
            }
            Err(e) => {
                error!(index = job.index, "Decode task panicked: {}", e);
                return None;
            }
        };

        if ctx.abort.is_set() {
            return None;
        }

        Some(PlaybackItem {
            index: job.index,
            text: job.text,
            is_first: job.is_first,
            is_last: job.is_last,
            frames,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_playback_consumer(
        session_id: String,
        device_id: String,
        mut rx: mpsc::Receiver<PlaybackEntry>,
        events: mpsc::Sender<SessionEvent>,
        abort: AbortFlag,
        gate: TurnGate,
        reporter: Arc<Reporter>,
        token: CancellationToken,
    ) {
        debug!("Playback consumer started");

        loop {
            let entry = tokio::select! {
                _ = token.cancelled() => break,
                entry = rx.recv() => match entry {
                    Some(entry) => entry,
                    None => break,
                },
            };

            let delivered = match entry {
                PlaybackEntry::Marker(TurnMarker::Start { turn_id }) => {
                    send_or_cancel(&events, SessionEvent::TurnStarted { turn_id }, &token).await
                }
                PlaybackEntry::Marker(TurnMarker::End { turn_id, seq }) => {
                    let sent =
                        send_or_cancel(&events, SessionEvent::TurnStopped { turn_id }, &token)
                            .await;
                    gate.complete(seq);
                    sent
                }
                PlaybackEntry::Audio(item) => {
                    if abort.is_set() {
                        debug!(index = item.index, "Abort set, skipping playback");
                        continue;
                    }
                    if item.is_first {
                        info!(session_id = %session_id, "First segment of turn: {}", item.text);
                    }
                    if item.is_last {
                        debug!(session_id = %session_id, index = item.index, "Last segment of turn");
                    }

                    let frame_count = item.frames.len();
                    let record = ReportRecord::new(&session_id, &device_id, &item.text, frame_count);
                    let sent = Self::send_item(&events, &abort, &token, item).await;
                    reporter.submit(record);
                    sent
                }
            };

            if !delivered {
                debug!("Outbound channel closed or pipeline cancelled, stopping playback consumer");
                break;
            }
        }

        rx.close();
        while rx.try_recv().is_ok() {}
        debug!("Playback consumer exited");
    }

    /// Send one segment's header and frames. Returns false once the outbound
    /// channel is gone or the pipeline is cancelled.
    async fn send_item(
        events: &mpsc::Sender<SessionEvent>,
        abort: &AbortFlag,
        token: &CancellationToken,
        item: PlaybackItem,
    ) -> bool {
        let header = SessionEvent::SentenceStarted {
            index: item.index,
            text: item.text,
            is_last: item.is_last,
        };
        if !send_or_cancel(events, header, token).await {
            return false;
        }
        for frame in item.frames {
            if abort.is_set() {
                break;
            }
            if !send_or_cancel(events, SessionEvent::Audio(frame), token).await {
                return false;
            }
        }
        true
    }

    /// Stop both consumers and drop everything still queued.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        self.cancel_token.cancel();
        self.gate.release();

        let tasks = [
            self.synthesis_task.lock().take(),
            self.playback_task.lock().take(),
        ];
        for task in tasks.into_iter().flatten() {
            if let Err(e) = task.await
                && !e.is_cancelled()
            {
                warn!("Pipeline consumer ended abnormally: {}", e);
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel_token.is_cancelled()
    }
}

/// Send `value` unless the pipeline is cancelled first.
///
/// A full outbound channel must not keep a consumer alive past shutdown.
async fn send_or_cancel<T>(tx: &mpsc::Sender<T>, value: T, token: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        sent = tx.send(value) => sent.is_ok(),
    }
}
