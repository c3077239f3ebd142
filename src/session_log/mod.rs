//! Run statistics for the collector.
//!
//! Tracks how many batches of each category were ingested, how many epochs
//! were emitted, and how much input was rejected, so a run can be audited
//! after the fact.

pub mod log;

// Re-export commonly used types
pub use log::{
    create_shared_log, create_shared_log_with_persistence, SessionLog, SessionStats,
    SharedSessionLog,
};
