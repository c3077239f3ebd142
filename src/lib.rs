//! GNSS Mount Eval - antenna and mounting quality from receiver telemetry.
//!
//! This library turns a stream of decoded per-satellite and per-signal
//! receiver telemetry into per-epoch quality features, and scores recorded
//! sessions on a comparable 1-10 scale.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      GNSS Mount Eval                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │  Collector  │──▶│    Epoch    │──▶│  Features   │        │
//! │  │  (replay)   │   │ Accumulator │   │  (per tow)  │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! │         │                                    │              │
//! │         ▼                                    ▼              │
//! │  ┌─────────────┐   ┌─────────────┐   ┌─────────────┐        │
//! │  │ Session Log │   │   Scoring   │◀──│ Feature CSV │        │
//! │  │  (counts)   │   │ (per label) │   │             │        │
//! │  └─────────────┘   └─────────────┘   └─────────────┘        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use gnss_mount_eval::collector::{EpochClock, SatelliteSample, TelemetryBatch};
//! use gnss_mount_eval::core::EpochAccumulator;
//!
//! let mut acc = EpochAccumulator::new("roof", EpochClock::SatelliteSnapshot);
//! let sat = SatelliteSample {
//!     gnss_id: 0,
//!     sv_id: 5,
//!     elevation_deg: 72.0,
//!     azimuth_deg: 140.0,
//!     cn0: 44.0,
//!     pseudorange_residual: Some(0.4),
//! };
//!
//! acc.ingest(TelemetryBatch::SatelliteSnapshot { time_tag: 1000, satellites: vec![sat] });
//! let closed = acc.ingest(TelemetryBatch::SatelliteSnapshot { time_tag: 2000, satellites: vec![] });
//! assert_eq!(closed.map(|f| f.num_tracked), Some(1));
//! ```

pub mod collector;
pub mod config;
pub mod core;
pub mod session_log;

// Re-export key types at crate root for convenience
pub use collector::{Collector, CollectorConfig, CollectorError, EpochClock, TelemetryBatch};
pub use config::{Config, ConfigError};
pub use crate::core::{
    map_linear_to_score, score, score_all, EpochAccumulator, EpochFeatures, ScoreWeights, Scores,
};
pub use session_log::{SessionLog, SessionStats, SharedSessionLog};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
