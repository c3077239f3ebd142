//! Decoded telemetry types consumed by the epoch accumulator.
//!
//! These are the typed outputs of the receiver protocol decoder: per-satellite
//! and per-signal snapshot samples, cycle-slip flags and DOP values, grouped
//! into batches that carry the time-of-week tag of the message they came from.

use serde::{Deserialize, Serialize};

/// Time-of-week tag in milliseconds, as reported by the receiver.
pub type TimeTag = u32;

/// Key identifying one satellite: `(gnss_id, sv_id)`.
pub type SatelliteKey = (u8, u8);

/// Minimum quality indicator for a signal to count as code and carrier locked.
pub const LOCK_QUALITY_THRESHOLD: u8 = 4;

/// One satellite from a satellite snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteSample {
    /// Constellation identifier
    pub gnss_id: u8,
    /// Satellite identifier within the constellation
    pub sv_id: u8,
    /// Elevation in degrees (nominally 0-90)
    pub elevation_deg: f64,
    /// Azimuth in degrees (0-360)
    pub azimuth_deg: f64,
    /// Carrier-to-noise density ratio in dB-Hz; zero or negative means not tracked
    pub cn0: f64,
    /// Pseudorange residual in meters, if the receiver reported one
    #[serde(default)]
    pub pseudorange_residual: Option<f64>,
}

impl SatelliteSample {
    pub fn key(&self) -> SatelliteKey {
        (self.gnss_id, self.sv_id)
    }

    /// Whether the receiver is actually tracking this satellite.
    pub fn is_tracked(&self) -> bool {
        self.cn0 > 0.0
    }
}

/// One signal from a signal snapshot.
///
/// Decode-only: the wire form carries a quality indicator, from which the
/// lock flag is derived.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawSignalSample")]
pub struct SignalSample {
    pub gnss_id: u8,
    pub sv_id: u8,
    /// Frequency band identifier
    pub freq_id: u8,
    pub signal_id: u8,
    pub cn0: f64,
    /// Quality indicator reached [`LOCK_QUALITY_THRESHOLD`]
    pub has_lock: bool,
    /// Set by a later cycle-slip update; false until then
    pub has_cycle_slip: bool,
    /// Elevation copied from the co-epoch satellite snapshot
    pub elevation_deg: Option<f64>,
}

impl SignalSample {
    /// Create a signal sample from decoded fields.
    ///
    /// A missing quality indicator is treated as "no lock".
    pub fn new(
        gnss_id: u8,
        sv_id: u8,
        freq_id: u8,
        signal_id: u8,
        cn0: f64,
        quality_ind: Option<u8>,
    ) -> Self {
        Self {
            gnss_id,
            sv_id,
            freq_id,
            signal_id,
            cn0,
            has_lock: quality_ind.is_some_and(|q| q >= LOCK_QUALITY_THRESHOLD),
            has_cycle_slip: false,
            elevation_deg: None,
        }
    }

    pub fn key(&self) -> SatelliteKey {
        (self.gnss_id, self.sv_id)
    }
}

/// Wire form of a signal sample, before lock derivation.
#[derive(Debug, Deserialize)]
struct RawSignalSample {
    gnss_id: u8,
    sv_id: u8,
    freq_id: u8,
    #[serde(default)]
    signal_id: u8,
    cn0: f64,
    #[serde(default)]
    quality_ind: Option<u8>,
}

impl From<RawSignalSample> for SignalSample {
    fn from(raw: RawSignalSample) -> Self {
        SignalSample::new(
            raw.gnss_id,
            raw.sv_id,
            raw.freq_id,
            raw.signal_id,
            raw.cn0,
            raw.quality_ind,
        )
    }
}

/// Cycle-slip state for one satellite from a measurement message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleSlipFlag {
    pub gnss_id: u8,
    pub sv_id: u8,
    pub has_cycle_slip: bool,
}

impl CycleSlipFlag {
    pub fn key(&self) -> SatelliteKey {
        (self.gnss_id, self.sv_id)
    }
}

/// Batch category, used to pick which one drives epoch boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchCategory {
    SatelliteSnapshot,
    SignalSnapshot,
    CycleSlipUpdate,
    Dop,
}

/// Which timed batch category acts as the epoch clock.
///
/// Only batches of this category close an epoch. DOP batches carry no
/// time tag and can never be the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpochClock {
    /// Measurement messages with a millisecond time-of-week counter
    #[default]
    CycleSlipUpdate,
    SatelliteSnapshot,
    SignalSnapshot,
}

impl EpochClock {
    pub fn category(self) -> BatchCategory {
        match self {
            EpochClock::CycleSlipUpdate => BatchCategory::CycleSlipUpdate,
            EpochClock::SatelliteSnapshot => BatchCategory::SatelliteSnapshot,
            EpochClock::SignalSnapshot => BatchCategory::SignalSnapshot,
        }
    }

    /// Parse a clock name as accepted on the command line.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "cycle_slip_update" | "cycle_slip" | "measx" => Some(EpochClock::CycleSlipUpdate),
            "satellite_snapshot" | "satellite" | "sat" => Some(EpochClock::SatelliteSnapshot),
            "signal_snapshot" | "signal" | "sig" => Some(EpochClock::SignalSnapshot),
            _ => None,
        }
    }
}

/// One decoded telemetry batch.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum TelemetryBatch {
    SatelliteSnapshot {
        time_tag: TimeTag,
        satellites: Vec<SatelliteSample>,
    },
    SignalSnapshot {
        time_tag: TimeTag,
        signals: Vec<SignalSample>,
    },
    CycleSlipUpdate {
        time_tag: TimeTag,
        flags: Vec<CycleSlipFlag>,
    },
    Dop {
        pdop: f64,
        tdop: f64,
    },
}

impl TelemetryBatch {
    pub fn category(&self) -> BatchCategory {
        match self {
            TelemetryBatch::SatelliteSnapshot { .. } => BatchCategory::SatelliteSnapshot,
            TelemetryBatch::SignalSnapshot { .. } => BatchCategory::SignalSnapshot,
            TelemetryBatch::CycleSlipUpdate { .. } => BatchCategory::CycleSlipUpdate,
            TelemetryBatch::Dop { .. } => BatchCategory::Dop,
        }
    }

    /// The batch's time-of-week tag, if its category carries one.
    pub fn time_tag(&self) -> Option<TimeTag> {
        match self {
            TelemetryBatch::SatelliteSnapshot { time_tag, .. }
            | TelemetryBatch::SignalSnapshot { time_tag, .. }
            | TelemetryBatch::CycleSlipUpdate { time_tag, .. } => Some(*time_tag),
            TelemetryBatch::Dop { .. } => None,
        }
    }

    /// Whether this batch drives epoch boundaries under the given clock.
    pub fn is_epoch_clock(&self, clock: EpochClock) -> bool {
        self.time_tag().is_some() && self.category() == clock.category()
    }
}
