//! Session scoring from aggregated epoch features.
//!
//! Per-label feature means are mapped onto a 1-10 scale with fixed
//! calibration endpoints, then combined into a weighted summary score.

use crate::core::features::EpochFeatures;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeSet;

/// Score returned when a calibration range is empty.
pub const NEUTRAL_SCORE: f64 = 5.0;

/// Fixed calibration of one feature onto the 1-10 scale.
///
/// Descending endpoints combined with `invert` mirror twice, so those
/// scores rise toward `lo`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub lo: f64,
    pub hi: f64,
    pub invert: bool,
}

impl Calibration {
    pub const SATELLITE_COUNT: Self = Self::new(4.0, 30.0, false);
    pub const MEAN_CN0: Self = Self::new(25.0, 50.0, false);
    pub const PR_RESIDUAL: Self = Self::new(5.0, 0.2, true);
    pub const CN0_FLICKER: Self = Self::new(6.0, 0.5, true);
    pub const DUAL_BAND: Self = Self::new(0.0, 0.8, false);
    pub const ELEV_COVERAGE: Self = Self::new(0.25, 0.80, false);
    pub const OVERHEAD_FRACTION: Self = Self::new(0.0, 0.6, false);
    pub const PDOP: Self = Self::new(4.0, 0.8, true);
    pub const TDOP: Self = Self::new(3.0, 0.6, true);
    pub const NO_SLIP: Self = Self::new(0.85, 0.999, false);

    pub const fn new(lo: f64, hi: f64, invert: bool) -> Self {
        Self { lo, hi, invert }
    }

    pub fn score(&self, value: f64) -> f64 {
        map_linear_to_score(value, self.lo, self.hi, self.invert)
    }
}

/// Fallback means used when no row supplies a value.
struct Fallback;

impl Fallback {
    const MEAN_ABS_PR_RES: f64 = 10.0;
    const HIGH_ELEV_CN0_STD: f64 = 4.0;
    const PDOP: f64 = 3.0;
    const TDOP: f64 = 2.0;
    const NO_SLIP_FRAC: f64 = 1.0;
    const OTHER: f64 = 0.0;
}

/// Map `value` from `[lo, hi]` onto `[1, 10]`, saturating outside the range.
///
/// With `invert`, the mapping is mirrored. An empty range (`hi == lo`)
/// yields [`NEUTRAL_SCORE`].
pub fn map_linear_to_score(value: f64, lo: f64, hi: f64, invert: bool) -> f64 {
    if hi == lo {
        return NEUTRAL_SCORE;
    }
    let mut t = ((value - lo) / (hi - lo)).clamp(0.0, 1.0);
    if invert {
        t = 1.0 - t;
    }
    1.0 + 9.0 * t
}

/// Relative weights of the component scores in the summary.
///
/// Weights left out of a configuration keep their default.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub satellite_availability: f64,
    pub signal_quality: f64,
    pub multipath_resistance: f64,
    pub dual_band_coverage: f64,
    pub sky_view: f64,
    pub geometry_quality: f64,
    pub lock_continuity: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            satellite_availability: 1.0,
            signal_quality: 1.0,
            multipath_resistance: 1.2,
            dual_band_coverage: 0.8,
            sky_view: 1.0,
            geometry_quality: 1.0,
            lock_continuity: 1.0,
        }
    }
}

impl ScoreWeights {
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.satellite_availability,
            self.signal_quality,
            self.multipath_resistance,
            self.dual_band_coverage,
            self.sky_view,
            self.geometry_quality,
            self.lock_continuity,
        ]
    }

    pub fn total(&self) -> f64 {
        self.as_array().iter().sum()
    }
}

/// Quality scores for one label, each nominally in `[1, 10]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scores {
    pub label: String,
    pub satellite_availability: f64,
    pub signal_quality: f64,
    pub multipath_resistance: f64,
    pub dual_band_coverage: f64,
    pub sky_view: f64,
    pub geometry_quality: f64,
    pub lock_continuity: f64,
    pub summary_score: f64,
}

impl Scores {
    /// The seven component scores, in weight order.
    pub fn components(&self) -> [f64; 7] {
        [
            self.satellite_availability,
            self.signal_quality,
            self.multipath_resistance,
            self.dual_band_coverage,
            self.sky_view,
            self.geometry_quality,
            self.lock_continuity,
        ]
    }
}

/// Per-label means of the numeric feature columns.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMeans {
    pub num_tracked: f64,
    pub mean_cn0: f64,
    pub frac_above_70: f64,
    pub elev_weighted_coverage: f64,
    pub mean_abs_pr_res: f64,
    pub high_elev_cn0_std: f64,
    pub dual_band_frac: f64,
    pub pdop: f64,
    pub tdop: f64,
    pub no_slip_frac: f64,
}

impl FeatureMeans {
    /// Average the rows carrying `label`.
    pub fn for_label(rows: &[EpochFeatures], label: &str) -> Self {
        let rows: Vec<&EpochFeatures> = rows.iter().filter(|r| r.label == label).collect();
        let avg = |values: Vec<f64>, fallback: f64| {
            if values.is_empty() {
                fallback
            } else {
                values.iter().mean()
            }
        };
        let column = |f: fn(&EpochFeatures) -> f64| rows.iter().map(|r| f(r)).collect::<Vec<_>>();

        Self {
            num_tracked: avg(column(|r| f64::from(r.num_tracked)), Fallback::OTHER),
            mean_cn0: avg(column(|r| r.mean_cn0), Fallback::OTHER),
            frac_above_70: avg(column(|r| r.frac_above_70), Fallback::OTHER),
            elev_weighted_coverage: avg(column(|r| r.elev_weighted_coverage), Fallback::OTHER),
            mean_abs_pr_res: avg(column(|r| r.mean_abs_pr_res), Fallback::MEAN_ABS_PR_RES),
            high_elev_cn0_std: avg(column(|r| r.high_elev_cn0_std), Fallback::HIGH_ELEV_CN0_STD),
            dual_band_frac: avg(column(|r| r.dual_band_frac), Fallback::OTHER),
            pdop: avg(rows.iter().filter_map(|r| r.pdop).collect(), Fallback::PDOP),
            tdop: avg(rows.iter().filter_map(|r| r.tdop).collect(), Fallback::TDOP),
            no_slip_frac: avg(column(|r| r.no_slip_frac), Fallback::NO_SLIP_FRAC),
        }
    }
}

/// Score one label.
///
/// If every weight is zero the summary is [`NEUTRAL_SCORE`].
pub fn score(rows: &[EpochFeatures], label: &str, weights: &ScoreWeights) -> Scores {
    let m = FeatureMeans::for_label(rows, label);

    let satellite_availability = Calibration::SATELLITE_COUNT.score(m.num_tracked);
    let signal_quality = Calibration::MEAN_CN0.score(m.mean_cn0);

    let residual = Calibration::PR_RESIDUAL.score(m.mean_abs_pr_res);
    let flicker = Calibration::CN0_FLICKER.score(m.high_elev_cn0_std);
    let multipath_resistance = 0.6 * residual + 0.4 * flicker;

    let dual_band_coverage = Calibration::DUAL_BAND.score(m.dual_band_frac);

    let coverage = Calibration::ELEV_COVERAGE.score(m.elev_weighted_coverage);
    let overhead = Calibration::OVERHEAD_FRACTION.score(m.frac_above_70);
    let sky_view = 0.6 * coverage + 0.4 * overhead;

    let pdop = Calibration::PDOP.score(m.pdop);
    let tdop = Calibration::TDOP.score(m.tdop);
    let geometry_quality = 0.6 * pdop + 0.4 * tdop;

    let lock_continuity = Calibration::NO_SLIP.score(m.no_slip_frac);

    let mut scores = Scores {
        label: label.to_string(),
        satellite_availability,
        signal_quality,
        multipath_resistance,
        dual_band_coverage,
        sky_view,
        geometry_quality,
        lock_continuity,
        summary_score: NEUTRAL_SCORE,
    };

    let total = weights.total();
    if total > 0.0 {
        scores.summary_score = scores
            .components()
            .iter()
            .zip(weights.as_array())
            .map(|(s, w)| s * w)
            .sum::<f64>()
            / total;
    }
    scores
}

/// Distinct labels in lexical order.
pub fn labels(rows: &[EpochFeatures]) -> Vec<String> {
    rows.iter()
        .map(|r| r.label.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Score every label present in `rows`, in lexical label order.
pub fn score_all(rows: &[EpochFeatures], weights: &ScoreWeights) -> Vec<Scores> {
    labels(rows)
        .iter()
        .map(|label| score(rows, label, weights))
        .collect()
}
