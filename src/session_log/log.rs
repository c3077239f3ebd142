//! Counters for one collection run, with cumulative persistence.

use crate::collector::types::BatchCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Statistics for the current run.
#[derive(Debug)]
pub struct SessionLog {
    /// Unique identifier of this run
    run_id: Uuid,
    satellite_batches: AtomicU64,
    signal_batches: AtomicU64,
    cycle_slip_batches: AtomicU64,
    dop_batches: AtomicU64,
    /// Input lines that failed to decode
    malformed_lines: AtomicU64,
    epochs_emitted: AtomicU64,
    rows_written: AtomicU64,
    /// Run start time
    run_start: DateTime<Utc>,
    /// Path for persisting cumulative stats
    persist_path: Option<PathBuf>,
    /// Totals loaded from previous runs
    previous: PersistedStats,
}

impl SessionLog {
    /// Create a new session log.
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            satellite_batches: AtomicU64::new(0),
            signal_batches: AtomicU64::new(0),
            cycle_slip_batches: AtomicU64::new(0),
            dop_batches: AtomicU64::new(0),
            malformed_lines: AtomicU64::new(0),
            epochs_emitted: AtomicU64::new(0),
            rows_written: AtomicU64::new(0),
            run_start: Utc::now(),
            persist_path: None,
            previous: PersistedStats::default(),
        }
    }

    /// Create a session log that adds its counts to totals stored at `path`.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!(error = %e, "could not load previous run statistics");
        }

        log
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Record one ingested batch.
    pub fn record_batch(&self, category: BatchCategory) {
        let counter = match category {
            BatchCategory::SatelliteSnapshot => &self.satellite_batches,
            BatchCategory::SignalSnapshot => &self.signal_batches,
            BatchCategory::CycleSlipUpdate => &self.cycle_slip_batches,
            BatchCategory::Dop => &self.dop_batches,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed_line(&self) {
        self.malformed_lines.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_epoch_emitted(&self) {
        self.epochs_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_row_written(&self) {
        self.rows_written.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the statistics of this run.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            run_id: self.run_id,
            satellite_batches: self.satellite_batches.load(Ordering::Relaxed),
            signal_batches: self.signal_batches.load(Ordering::Relaxed),
            cycle_slip_batches: self.cycle_slip_batches.load(Ordering::Relaxed),
            dop_batches: self.dop_batches.load(Ordering::Relaxed),
            malformed_lines: self.malformed_lines.load(Ordering::Relaxed),
            epochs_emitted: self.epochs_emitted.load(Ordering::Relaxed),
            rows_written: self.rows_written.load(Ordering::Relaxed),
            run_start: self.run_start,
            run_duration_secs: (Utc::now() - self.run_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Run Statistics ({}):\n\
             - Satellite snapshots: {}\n\
             - Signal snapshots: {}\n\
             - Cycle-slip updates: {}\n\
             - DOP updates: {}\n\
             - Malformed lines skipped: {}\n\
             - Epochs emitted: {}\n\
             - Rows written: {}\n\
             - Run duration: {} seconds",
            stats.run_id,
            stats.satellite_batches,
            stats.signal_batches,
            stats.cycle_slip_batches,
            stats.dop_batches,
            stats.malformed_lines,
            stats.epochs_emitted,
            stats.rows_written,
            stats.run_duration_secs
        )
    }

    /// Save cumulative totals to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                runs: self.previous.runs + 1,
                batches: self.previous.batches
                    + stats.satellite_batches
                    + stats.signal_batches
                    + stats.cycle_slip_batches
                    + stats.dop_batches,
                malformed_lines: self.previous.malformed_lines + stats.malformed_lines,
                epochs_emitted: self.previous.epochs_emitted + stats.epochs_emitted,
                rows_written: self.previous.rows_written + stats.rows_written,
                last_run_id: Some(self.run_id),
                last_updated: Some(Utc::now()),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load previous totals from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                self.previous = serde_json::from_str(&content).map_err(std::io::Error::other)?;
            }
        }
        Ok(())
    }
}

impl Default for SessionLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of run statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    pub run_id: Uuid,
    pub satellite_batches: u64,
    pub signal_batches: u64,
    pub cycle_slip_batches: u64,
    pub dop_batches: u64,
    pub malformed_lines: u64,
    pub epochs_emitted: u64,
    pub rows_written: u64,
    pub run_start: DateTime<Utc>,
    pub run_duration_secs: u64,
}

/// Cumulative totals across runs, as persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedStats {
    pub runs: u64,
    pub batches: u64,
    pub malformed_lines: u64,
    pub epochs_emitted: u64,
    pub rows_written: u64,
    pub last_run_id: Option<Uuid>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl PersistedStats {
    /// Read persisted totals, if the file exists.
    pub fn read(path: &std::path::Path) -> Result<Option<Self>, std::io::Error> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map(Some)
            .map_err(std::io::Error::other)
    }
}

/// Thread-safe shared session log.
pub type SharedSessionLog = Arc<SessionLog>;

/// Create a new shared session log.
pub fn create_shared_log() -> SharedSessionLog {
    Arc::new(SessionLog::new())
}

/// Create a new shared session log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedSessionLog {
    Arc::new(SessionLog::with_persistence(path))
}
