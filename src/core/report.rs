//! Background reporting of spoken segments
//!
//! Reports are handed to a bounded queue drained by a single consumer task.
//! Submitting never waits: when the queue is full the record is dropped.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REPORT_QUEUE_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportRecord {
    pub session_id: String,
    pub device_id: String,
    pub text: String,
    pub audio_frames: usize,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
}

impl ReportRecord {
    pub fn new(session_id: &str, device_id: &str, text: &str, audio_frames: usize) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            session_id: session_id.to_string(),
            device_id: device_id.to_string(),
            text: text.to_string(),
            audio_frames,
            timestamp_ms,
        }
    }
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, record: ReportRecord);
}

/// Sink that writes reports to the log
#[derive(Debug, Clone, Default)]
pub struct LogReportSink;

#[async_trait]
impl ReportSink for LogReportSink {
    async fn report(&self, record: ReportRecord) {
        info!(
            session_id = %record.session_id,
            device_id = %record.device_id,
            audio_frames = record.audio_frames,
            "Spoke: {}",
            record.text
        );
    }
}

/// Per-session handle on the reporting consumer
pub struct Reporter {
    tx: Mutex<Option<mpsc::Sender<ReportRecord>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Reporter {
    /// Spawn the consumer task
    pub fn spawn(sink: Arc<dyn ReportSink>) -> Self {
        let (tx, mut rx) = mpsc::channel::<ReportRecord>(REPORT_QUEUE_SIZE);
        let worker = tokio::spawn(async move {
            while let Some(record) = rx.recv().await {
                sink.report(record).await;
            }
            debug!("Report consumer stopped");
        });

        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Reporter that drops everything
    pub fn disabled() -> Self {
        Self {
            tx: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    /// Queue a record without waiting
    pub fn submit(&self, record: ReportRecord) {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return;
        };
        if let Err(e) = tx.try_send(record) {
            warn!("Dropping report record: {}", e);
        }
    }

    /// Stop accepting records and let the consumer drain what is queued
    pub async fn shutdown(&self) {
        self.tx.lock().take();
        let worker = self.worker.lock().take();
        if let Some(worker) = worker
            && let Err(e) = worker.await
        {
            warn!("Report consumer ended abnormally: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[tokio::test]
    async fn test_records_reach_sink_before_shutdown_returns() {
        let sink = Arc::new(CollectingSink::default());
        let reporter = Reporter::spawn(sink.clone());

        reporter.submit(ReportRecord::new("s1", "d1", "hello", 3));
        reporter.submit(ReportRecord::new("s1", "d1", "world", 2));
        reporter.shutdown().await;

        let records = sink.records.lock();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].text, "hello");
        assert_eq!(records[1].audio_frames, 2);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_is_ignored() {
        let sink = Arc::new(CollectingSink::default());
        let reporter = Reporter::spawn(sink.clone());
        reporter.shutdown().await;
        reporter.shutdown().await;
        reporter.submit(ReportRecord::new("s1", "d1", "late", 1));
        assert!(sink.records.lock().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_reporter_drops_records() {
        let reporter = Reporter::disabled();
        reporter.submit(ReportRecord::new("s1", "d1", "x", 1));
        reporter.shutdown().await;
    }
}
