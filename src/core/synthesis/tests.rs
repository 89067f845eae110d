use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use rand::Rng;
use tokio::sync::mpsc;

use super::{PipelineContext, SynthesisPipeline};
use crate::core::report::{ReportRecord, ReportSink, Reporter};
use crate::core::segmenter::Segment;
use crate::core::session::events::{SessionEvent, TurnMarker};
use crate::core::session::state::{AbortFlag, TurnGate};
use crate::core::tts::{AudioFormat, AudioSource, SynthesizedAudio, Synthesizer, TTSError, TTSResult};

/// Synthesizer whose per-text latency and failures are scripted.
///
/// The "audio" is the text itself, so decoded frames identify their segment.
#[derive(Default)]
struct ScriptedSynthesizer {
    delays: HashMap<String, Duration>,
    failures: HashSet<String>,
    owns_files: bool,
    discarded: AtomicUsize,
}

impl ScriptedSynthesizer {
    fn with_delays(delays: &[(&str, u64)]) -> Self {
        Self {
            delays: delays
                .iter()
                .map(|(text, ms)| (text.to_string(), Duration::from_millis(*ms)))
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Synthesizer for ScriptedSynthesizer {
    async fn synthesize(&self, text: &str) -> TTSResult<Option<SynthesizedAudio>> {
        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }
        if self.failures.contains(text) {
            return Err(TTSError::AudioGenerationFailed(text.to_string()));
        }
        Ok(Some(SynthesizedAudio::from_buffer(
            text.as_bytes().to_vec(),
            16000,
        )))
    }

    fn decode(&self, audio: &SynthesizedAudio, _format: AudioFormat) -> TTSResult<Vec<Bytes>> {
        match &audio.source {
            AudioSource::Buffer(data) => Ok(vec![data.clone()]),
            AudioSource::File(_) => Err(TTSError::DecodeFailed("unexpected file".to_string())),
        }
    }

    fn owns_transient_files(&self) -> bool {
        self.owns_files
    }

    fn discard(&self, _audio: &SynthesizedAudio) {
        self.discarded.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct CollectingSink {
    records: Mutex<Vec<ReportRecord>>,
}

#[async_trait]
impl ReportSink for CollectingSink {
    async fn report(&self, record: ReportRecord) {
        self.records.lock().push(record);
    }
}

struct Harness {
    pipeline: SynthesisPipeline,
    events: mpsc::Receiver<SessionEvent>,
    abort: AbortFlag,
    gate: TurnGate,
    reporter: Arc<Reporter>,
}

fn harness(synthesizer: Arc<ScriptedSynthesizer>, timeout: Duration) -> Harness {
    harness_with_reporter(synthesizer, timeout, Arc::new(Reporter::disabled()))
}

fn harness_with_reporter(
    synthesizer: Arc<ScriptedSynthesizer>,
    timeout: Duration,
    reporter: Arc<Reporter>,
) -> Harness {
    let (events_tx, events) = mpsc::channel(256);
    let abort = AbortFlag::new();
    let gate = TurnGate::new();
    let pipeline = SynthesisPipeline::start(PipelineContext {
        session_id: "session-1".to_string(),
        device_id: "device-1".to_string(),
        synthesizer,
        audio_format: AudioFormat::Pcm,
        synthesis_timeout: timeout,
        workers: 4,
        queue_size: 16,
        abort: abort.clone(),
        gate: gate.clone(),
        events: events_tx,
        reporter: reporter.clone(),
    });
    Harness {
        pipeline,
        events,
        abort,
        gate,
        reporter,
    }
}

fn segment(index: u32, text: &str) -> Segment {
    Segment {
        index,
        raw: text.to_string(),
        text: text.to_string(),
        is_first: index == 1,
        is_last: false,
    }
}

fn start(turn_id: &str) -> TurnMarker {
    TurnMarker::Start {
        turn_id: turn_id.to_string(),
    }
}

fn end(turn_id: &str, seq: u64) -> TurnMarker {
    TurnMarker::End {
        turn_id: turn_id.to_string(),
        seq,
    }
}

/// Collect events up to and including the next `TurnStopped`
async fn collect_turn(events: &mut mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
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

fn spoken_indices(events: &[SessionEvent]) -> Vec<u32> {
    events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::SentenceStarted { index, .. } => Some(*index),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_playback_order_matches_submission_order() {
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let count = rng.gen_range(2..12);
        let texts: Vec<String> = (1..=count).map(|i| format!("segment {i}")).collect();
        let delays: Vec<(&str, u64)> = texts
            .iter()
            .map(|t| (t.as_str(), rng.gen_range(0..500)))
            .collect();

        let synthesizer = Arc::new(ScriptedSynthesizer::with_delays(&delays));
        let mut h = harness(synthesizer, Duration::from_secs(10));

        h.pipeline.enqueue_marker(start("t1")).await.unwrap();
        for (i, text) in texts.iter().enumerate() {
            h.pipeline
                .enqueue_segment(&segment(i as u32 + 1, text))
                .await
                .unwrap();
        }
        h.pipeline.enqueue_marker(end("t1", 1)).await.unwrap();

        let events = collect_turn(&mut h.events).await;
        assert_eq!(
            events.first(),
            Some(&SessionEvent::TurnStarted {
                turn_id: "t1".to_string()
            })
        );
        assert_eq!(spoken_indices(&events), (1..=count as u32).collect::<Vec<_>>());

        // Each header is followed by exactly its own audio
        for pair in events.windows(2) {
            if let [SessionEvent::SentenceStarted { text, .. }, next] = pair {
                assert_eq!(next, &SessionEvent::Audio(Bytes::from(text.clone())));
            }
        }

        h.pipeline.shutdown().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_abort_before_completion_drops_audio() {
    let synthesizer = Arc::new(ScriptedSynthesizer::with_delays(&[("slow one", 1000)]));
    let mut h = harness(synthesizer, Duration::from_secs(10));

    h.pipeline.enqueue_marker(start("t1")).await.unwrap();
    h.pipeline.enqueue_segment(&segment(1, "slow one")).await.unwrap();
    h.abort.set();
    h.pipeline.enqueue_marker(end("t1", 1)).await.unwrap();

    let events = collect_turn(&mut h.events).await;
    assert!(spoken_indices(&events).is_empty());
    assert!(!events.iter().any(|e| matches!(e, SessionEvent::Audio(_))));
    assert_eq!(events.len(), 2);

    // The end marker still goes through so the next turn can start
    assert_eq!(h.gate.completed(), 1);
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_timeout_skips_segment_and_continues() {
    let synthesizer = Arc::new(ScriptedSynthesizer {
        owns_files: true,
        ..ScriptedSynthesizer::with_delays(&[("stuck", 5000)])
    });
    let mut h = harness(synthesizer.clone(), Duration::from_secs(1));

    h.pipeline.enqueue_marker(start("t1")).await.unwrap();
    h.pipeline.enqueue_segment(&segment(1, "stuck")).await.unwrap();
    h.pipeline.enqueue_segment(&segment(2, "fine")).await.unwrap();
    h.pipeline.enqueue_marker(end("t1", 1)).await.unwrap();

    let events = collect_turn(&mut h.events).await;
    assert_eq!(spoken_indices(&events), vec![2]);

    // The late artifact is released by its own job once it finishes
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(synthesizer.discarded.load(Ordering::SeqCst), 2);

    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_failed_segment_is_skipped() {
    let synthesizer = Arc::new(ScriptedSynthesizer {
        failures: HashSet::from(["broken".to_string()]),
        ..Default::default()
    });
    let mut h = harness(synthesizer, Duration::from_secs(10));

    h.pipeline.enqueue_marker(start("t1")).await.unwrap();
    for (i, text) in ["first", "broken", "third"].iter().enumerate() {
        h.pipeline
            .enqueue_segment(&segment(i as u32 + 1, text))
            .await
            .unwrap();
    }
    h.pipeline.enqueue_marker(end("t1", 1)).await.unwrap();

    let events = collect_turn(&mut h.events).await;
    assert_eq!(spoken_indices(&events), vec![1, 3]);
    h.pipeline.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_spoken_segments_are_reported() {
    let sink = Arc::new(CollectingSink::default());
    let reporter = Arc::new(Reporter::spawn(sink.clone()));
    let synthesizer = Arc::new(ScriptedSynthesizer::default());
    let mut h = harness_with_reporter(synthesizer, Duration::from_secs(10), reporter);

    h.pipeline.enqueue_marker(start("t1")).await.unwrap();
    h.pipeline.enqueue_segment(&segment(1, "hello")).await.unwrap();
    h.pipeline.enqueue_marker(end("t1", 1)).await.unwrap();
    collect_turn(&mut h.events).await;

    h.pipeline.shutdown().await;
    h.reporter.shutdown().await;

    let records = sink.records.lock();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].text, "hello");
    assert_eq!(records[0].session_id, "session-1");
    assert_eq!(records[0].audio_frames, 1);
}

#[tokio::test]
async fn test_shutdown_is_idempotent_and_closes_queue() {
    let synthesizer = Arc::new(ScriptedSynthesizer::default());
    let h = harness(synthesizer, Duration::from_secs(10));

    h.pipeline.shutdown().await;
    h.pipeline.shutdown().await;
    assert!(h.pipeline.is_closed());

    assert!(h.pipeline.enqueue_segment(&segment(1, "late")).await.is_err());
    assert!(h.pipeline.enqueue_marker(start("t2")).await.is_err());

    // Waiters on the gate are released
    h.gate.wait_for(42).await;
}
