//! Telemetry intake for the epoch accumulator.
//!
//! Protocol decoding happens upstream; this module defines the decoded
//! batch types and replays them, in order, into a single-consumer queue.

pub mod replay;
pub mod types;

// Re-export commonly used types
pub use replay::{open_source, CollectorConfig, CollectorError, ReplayCollector, ReplayStats};
pub use types::{
    BatchCategory, CycleSlipFlag, EpochClock, SatelliteKey, SatelliteSample, SignalSample,
    TelemetryBatch, TimeTag, LOCK_QUALITY_THRESHOLD,
};

/// Platform-agnostic collector type alias
pub type Collector = ReplayCollector;
