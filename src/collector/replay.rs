//! Replay of decoded telemetry batches from a JSON-lines source.
//!
//! The source is read on a worker thread and each decoded batch is pushed
//! through a bounded channel, so the consumer sees batches one at a time in
//! arrival order. Malformed lines are logged, counted and skipped.

use crate::collector::types::TelemetryBatch;
use crate::session_log::SharedSessionLog;
use crossbeam_channel::{bounded, Receiver, Sender};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Configuration for the replay collector.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Capacity of the batch queue
    pub channel_capacity: usize,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 10_000,
        }
    }
}

/// Errors that can occur during collection.
#[derive(Debug)]
pub enum CollectorError {
    AlreadyRunning,
    Io(std::io::Error),
}

impl std::fmt::Display for CollectorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectorError::AlreadyRunning => write!(f, "Collector is already running"),
            CollectorError::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for CollectorError {}

impl From<std::io::Error> for CollectorError {
    fn from(e: std::io::Error) -> Self {
        CollectorError::Io(e)
    }
}

/// Counts from one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub lines: u64,
    pub batches: u64,
    pub malformed: u64,
}

/// Open a batch source: a file path, or stdin for `None` / `-`.
pub fn open_source(path: Option<&Path>) -> Result<Box<dyn BufRead + Send>, CollectorError> {
    match path {
        Some(p) if p != Path::new("-") => Ok(Box::new(BufReader::new(File::open(p)?))),
        _ => Ok(Box::new(BufReader::new(std::io::stdin()))),
    }
}

/// Feeds decoded batches from a reader into a single-consumer queue.
pub struct ReplayCollector {
    sender: Option<Sender<TelemetryBatch>>,
    receiver: Receiver<TelemetryBatch>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<ReplayStats>>,
    log: Option<SharedSessionLog>,
}

impl ReplayCollector {
    /// Create a new replay collector.
    pub fn new(config: CollectorConfig) -> Self {
        let (sender, receiver) = bounded(config.channel_capacity.max(1));
        Self {
            sender: Some(sender),
            receiver,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
            log: None,
        }
    }

    /// Count malformed lines in the given session log.
    pub fn with_session_log(mut self, log: SharedSessionLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Start reading `source` on a worker thread.
    ///
    /// A collector replays exactly one source.
    pub fn start<R>(&mut self, source: R) -> Result<(), CollectorError>
    where
        R: BufRead + Send + 'static,
    {
        let Some(sender) = self.sender.take() else {
            return Err(CollectorError::AlreadyRunning);
        };
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let log = self.log.clone();
        let worker = thread::Builder::new()
            .name("telemetry-replay".to_string())
            .spawn(move || replay(source, &sender, &running, log.as_ref()))?;
        self.worker = Some(worker);
        Ok(())
    }

    /// Ask the worker to stop after its current line.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the collector is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the receiver for decoded batches.
    pub fn receiver(&self) -> &Receiver<TelemetryBatch> {
        &self.receiver
    }

    /// Wait for the worker to finish and return its counts.
    ///
    /// Only call this once the queue has disconnected or been drained,
    /// otherwise the worker may still be blocked on a full queue.
    pub fn join(&mut self) -> Option<ReplayStats> {
        self.worker.take().and_then(|w| w.join().ok())
    }
}

fn replay<R: BufRead>(
    source: R,
    sender: &Sender<TelemetryBatch>,
    running: &AtomicBool,
    log: Option<&SharedSessionLog>,
) -> ReplayStats {
    let mut stats = ReplayStats::default();

    for (index, line) in source.lines().enumerate() {
        if !running.load(Ordering::SeqCst) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "telemetry source read failed");
                break;
            }
        };
        stats.lines += 1;
        if line.trim().is_empty() {
            continue;
        }

        match serde_json::from_str::<TelemetryBatch>(&line) {
            Ok(batch) => {
                stats.batches += 1;
                if sender.send(batch).is_err() {
                    // Consumer hung up
                    break;
                }
            }
            Err(e) => {
                stats.malformed += 1;
                if let Some(log) = log {
                    log.record_malformed_line();
                }
                tracing::warn!(line = index + 1, error = %e, "skipping malformed batch");
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    tracing::debug!(
        lines = stats.lines,
        batches = stats.batches,
        malformed = stats.malformed,
        "telemetry replay finished"
    );
    stats
}
