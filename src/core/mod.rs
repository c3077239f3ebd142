//! Core functionality for GNSS mount evaluation.
//!
//! This module contains:
//! - Epoch accumulation from decoded telemetry batches
//! - Feature computation from one epoch's samples
//! - Per-label scoring across recorded sessions
//! - CSV tables for features and scores

pub mod epoch;
pub mod features;
pub mod scoring;
pub mod table;

// Re-export commonly used types
pub use epoch::{EpochAccumulator, OpenEpoch};
pub use features::{build, build_with_trace, DualBandTrace, EpochFeatures};
pub use scoring::{map_linear_to_score, score, score_all, Calibration, ScoreWeights, Scores};
pub use table::{FeatureTableWriter, TableError, FEATURE_COLUMNS, SCORE_COLUMNS};
