//! Feature computation from one epoch of buffered samples.
//!
//! Everything here is pure: the same buffers always give the same
//! [`EpochFeatures`]. Aggregates over empty subsets fall back to neutral
//! defaults instead of dividing by zero.

use crate::collector::types::{SatelliteKey, SatelliteSample, SignalSample, TimeTag};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, BTreeSet};

/// Elevation at or above which a satellite counts as "overhead".
pub const OVERHEAD_ELEVATION_DEG: f64 = 70.0;

/// Elevation at or above which C/N0 instability is attributed to multipath.
pub const HIGH_ELEVATION_DEG: f64 = 45.0;

/// Quality features derived from one navigation epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochFeatures {
    /// Session label
    pub label: String,
    /// Time-of-week of the epoch in milliseconds
    #[serde(rename = "utcTowMs")]
    pub time_of_week_ms: TimeTag,
    /// Satellites with a positive C/N0
    pub num_tracked: u32,
    /// Mean C/N0 over tracked satellites (dB-Hz)
    pub mean_cn0: f64,
    /// Fraction of tracked satellites at or above 70 degrees
    pub frac_above_70: f64,
    /// C/N0-weighted mean of sin(elevation)
    pub elev_weighted_coverage: f64,
    /// Mean absolute pseudorange residual (meters)
    pub mean_abs_pr_res: f64,
    /// Population std dev of C/N0 at or above 45 degrees
    pub high_elev_cn0_std: f64,
    /// Fraction of satellites seen on two or more frequency bands
    pub dual_band_frac: f64,
    pub pdop: Option<f64>,
    pub tdop: Option<f64>,
    /// Fraction of signals without a cycle slip
    pub no_slip_frac: f64,
}

/// Intermediate grouping behind `dual_band_frac`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DualBandTrace {
    /// Number of signal samples grouped
    pub signal_count: usize,
    /// Distinct frequency bands per satellite
    pub bands: BTreeMap<SatelliteKey, BTreeSet<u8>>,
    /// Satellites with two or more distinct bands
    pub dual_band_count: usize,
}

impl DualBandTrace {
    /// Group signals by satellite and collect their frequency bands.
    pub fn from_signals(signals: &[SignalSample]) -> Self {
        let mut bands: BTreeMap<SatelliteKey, BTreeSet<u8>> = BTreeMap::new();
        for sig in signals {
            bands.entry(sig.key()).or_default().insert(sig.freq_id);
        }
        let dual_band_count = bands.values().filter(|freqs| freqs.len() >= 2).count();

        Self {
            signal_count: signals.len(),
            bands,
            dual_band_count,
        }
    }

    pub fn satellite_count(&self) -> usize {
        self.bands.len()
    }

    pub fn dual_band_frac(&self) -> f64 {
        if self.bands.is_empty() {
            0.0
        } else {
            self.dual_band_count as f64 / self.bands.len() as f64
        }
    }
}

/// Compute features for one epoch.
pub fn build(
    satellites: &[SatelliteSample],
    signals: &[SignalSample],
    pdop: Option<f64>,
    tdop: Option<f64>,
    label: &str,
    time_of_week_ms: TimeTag,
) -> EpochFeatures {
    build_with_trace(satellites, signals, pdop, tdop, label, time_of_week_ms).0
}

/// Compute features for one epoch, also returning the dual-band grouping.
pub fn build_with_trace(
    satellites: &[SatelliteSample],
    signals: &[SignalSample],
    pdop: Option<f64>,
    tdop: Option<f64>,
    label: &str,
    time_of_week_ms: TimeTag,
) -> (EpochFeatures, DualBandTrace) {
    let tracked: Vec<&SatelliteSample> = satellites.iter().filter(|s| s.is_tracked()).collect();
    let num_tracked = tracked.len();
    let denom = num_tracked.max(1) as f64;

    let mean_cn0 = tracked.iter().map(|s| s.cn0).sum::<f64>() / denom;

    let overhead = tracked
        .iter()
        .filter(|s| s.elevation_deg >= OVERHEAD_ELEVATION_DEG)
        .count();
    let frac_above_70 = if num_tracked > 0 {
        overhead as f64 / denom
    } else {
        0.0
    };

    let trace = DualBandTrace::from_signals(signals);

    let features = EpochFeatures {
        label: label.to_string(),
        time_of_week_ms,
        num_tracked: num_tracked as u32,
        mean_cn0,
        frac_above_70,
        elev_weighted_coverage: elevation_weighted_coverage(&tracked),
        mean_abs_pr_res: mean_abs_residual(satellites),
        high_elev_cn0_std: high_elevation_cn0_std(&tracked),
        dual_band_frac: trace.dual_band_frac(),
        pdop,
        tdop,
        no_slip_frac: no_slip_fraction(signals),
    };

    (features, trace)
}

/// Sum of cn0 * sin(elevation) over sum of cn0.
fn elevation_weighted_coverage(tracked: &[&SatelliteSample]) -> f64 {
    let (num, den) = tracked.iter().fold((0.0, 0.0), |(num, den), s| {
        (
            num + s.cn0 * s.elevation_deg.to_radians().sin(),
            den + s.cn0,
        )
    });
    if den > 0.0 {
        num / den
    } else {
        0.0
    }
}

/// Mean |residual| over every satellite with a finite residual.
fn mean_abs_residual(satellites: &[SatelliteSample]) -> f64 {
    let residuals: Vec<f64> = satellites
        .iter()
        .filter_map(|s| s.pseudorange_residual)
        .filter(|r| r.is_finite())
        .map(f64::abs)
        .collect();
    if residuals.is_empty() {
        0.0
    } else {
        residuals.iter().sum::<f64>() / residuals.len() as f64
    }
}

fn high_elevation_cn0_std(tracked: &[&SatelliteSample]) -> f64 {
    let values: Vec<f64> = tracked
        .iter()
        .filter(|s| s.elevation_deg >= HIGH_ELEVATION_DEG)
        .map(|s| s.cn0)
        .collect();
    if values.is_empty() {
        return 0.0;
    }
    values.iter().population_std_dev()
}

/// An epoch without signals counts as fully locked.
fn no_slip_fraction(signals: &[SignalSample]) -> f64 {
    if signals.is_empty() {
        return 1.0;
    }
    let ok = signals.iter().filter(|s| !s.has_cycle_slip).count();
    ok as f64 / signals.len() as f64
}
