//! Epoch accumulation from decoded telemetry batches.
//!
//! Samples are buffered per navigation epoch. An epoch closes when a batch
//! from the epoch-clock category arrives with a new time-of-week tag; the
//! closed epoch's buffers are reduced to [`EpochFeatures`] and then cleared.
//!
//! The accumulator is a single-writer state machine. Callers feeding it from
//! several threads must funnel batches through one ordered queue first.

use crate::collector::types::{
    CycleSlipFlag, EpochClock, SatelliteKey, SatelliteSample, SignalSample, TelemetryBatch,
    TimeTag,
};
use crate::core::features::{self, EpochFeatures};
use std::collections::HashMap;

/// Diagnostic view of the currently open epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenEpoch {
    pub time_tag: Option<TimeTag>,
    pub satellite_count: usize,
    pub signal_count: usize,
}

/// Groups telemetry batches into epochs and emits features on boundaries.
pub struct EpochAccumulator {
    /// Session label stamped on emitted features
    label: String,
    /// Which batch category closes epochs in [`EpochAccumulator::ingest`]
    clock: EpochClock,
    /// Tag of the open epoch
    current_epoch: Option<TimeTag>,
    /// Latest satellite snapshot (replacement set)
    satellites: Vec<SatelliteSample>,
    /// Latest signal snapshot (replacement set)
    signals: Vec<SignalSample>,
    /// First position of each satellite in `signals`
    signal_index: HashMap<SatelliteKey, usize>,
    latest_pdop: Option<f64>,
    latest_tdop: Option<f64>,
}

impl EpochAccumulator {
    /// Create an accumulator with empty buffers and no open epoch.
    pub fn new(label: impl Into<String>, clock: EpochClock) -> Self {
        Self {
            label: label.into(),
            clock,
            current_epoch: None,
            satellites: Vec::new(),
            signals: Vec::new(),
            signal_index: HashMap::new(),
            latest_pdop: None,
            latest_tdop: None,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn clock(&self) -> EpochClock {
        self.clock
    }

    pub fn current_epoch(&self) -> Option<TimeTag> {
        self.current_epoch
    }

    pub fn satellites(&self) -> &[SatelliteSample] {
        &self.satellites
    }

    pub fn signals(&self) -> &[SignalSample] {
        &self.signals
    }

    pub fn open_epoch(&self) -> OpenEpoch {
        OpenEpoch {
            time_tag: self.current_epoch,
            satellite_count: self.satellites.len(),
            signal_count: self.signals.len(),
        }
    }

    /// Route one batch.
    ///
    /// A batch of the clock category first closes the open epoch if its tag
    /// differs, then lands in the fresh buffers.
    pub fn ingest(&mut self, batch: TelemetryBatch) -> Option<EpochFeatures> {
        let flushed = match batch.time_tag() {
            Some(tag) if batch.is_epoch_clock(self.clock) => self.maybe_flush(tag),
            _ => None,
        };

        match batch {
            TelemetryBatch::SatelliteSnapshot {
                time_tag,
                satellites,
            } => self.ingest_satellite_snapshot(satellites, time_tag),
            TelemetryBatch::SignalSnapshot { time_tag, signals } => {
                self.ingest_signal_snapshot(signals, time_tag)
            }
            TelemetryBatch::CycleSlipUpdate { time_tag, flags } => {
                self.ingest_cycle_slip_update(&flags, time_tag)
            }
            TelemetryBatch::Dop { pdop, tdop } => self.ingest_dop(pdop, tdop),
        }

        flushed
    }

    /// Replace the satellite buffer with a new snapshot.
    pub fn ingest_satellite_snapshot(&mut self, samples: Vec<SatelliteSample>, time_tag: TimeTag) {
        self.adopt_if_unset(time_tag);
        self.satellites = samples;
    }

    /// Replace the signal buffer, copying elevations from the satellite buffer.
    pub fn ingest_signal_snapshot(&mut self, mut samples: Vec<SignalSample>, time_tag: TimeTag) {
        self.adopt_if_unset(time_tag);

        // Reversed so the first satellite with a given key wins
        let elevations: HashMap<SatelliteKey, f64> = self
            .satellites
            .iter()
            .rev()
            .map(|s| (s.key(), s.elevation_deg))
            .collect();

        self.signal_index.clear();
        for (i, sig) in samples.iter_mut().enumerate() {
            sig.elevation_deg = elevations.get(&sig.key()).copied();
            self.signal_index.entry(sig.key()).or_insert(i);
        }
        self.signals = samples;
    }

    /// Overwrite cycle-slip flags on buffered signals.
    ///
    /// Only the first buffered signal of each satellite is updated; flags for
    /// satellites with no buffered signal are ignored.
    pub fn ingest_cycle_slip_update(&mut self, updates: &[CycleSlipFlag], time_tag: TimeTag) {
        self.adopt_if_unset(time_tag);

        for update in updates {
            if let Some(&i) = self.signal_index.get(&update.key()) {
                self.signals[i].has_cycle_slip = update.has_cycle_slip;
            }
        }
    }

    /// Record the receiver-wide DOP values.
    pub fn ingest_dop(&mut self, pdop: f64, tdop: f64) {
        self.latest_pdop = Some(pdop);
        self.latest_tdop = Some(tdop);
    }

    /// Close the open epoch if `incoming` starts a new one.
    ///
    /// Returns the closed epoch's features, tagged with the old epoch's tag.
    pub fn maybe_flush(&mut self, incoming: TimeTag) -> Option<EpochFeatures> {
        let Some(current) = self.current_epoch else {
            self.current_epoch = Some(incoming);
            return None;
        };
        if incoming == current {
            return None;
        }

        let (features, trace) = features::build_with_trace(
            &self.satellites,
            &self.signals,
            self.latest_pdop,
            self.latest_tdop,
            &self.label,
            current,
        );
        tracing::trace!(
            epoch = current,
            signals = trace.signal_count,
            satellites = trace.satellite_count(),
            dual_band = trace.dual_band_count,
            "dual-band grouping"
        );
        tracing::debug!(
            epoch = current,
            next = incoming,
            tracked = features.num_tracked,
            "epoch closed"
        );

        self.current_epoch = Some(incoming);
        self.clear_buffers();
        Some(features)
    }

    /// Discard the open epoch at end of stream.
    ///
    /// The open epoch never saw its closing boundary, so no features are
    /// produced for it. Returns the number of buffered samples dropped.
    pub fn finish(&mut self) -> usize {
        let dropped = self.satellites.len() + self.signals.len();
        if let Some(epoch) = self.current_epoch.take() {
            tracing::debug!(epoch, dropped, "discarding unterminated epoch");
        }
        self.clear_buffers();
        dropped
    }

    fn adopt_if_unset(&mut self, time_tag: TimeTag) {
        if self.current_epoch.is_none() {
            self.current_epoch = Some(time_tag);
        }
    }

    fn clear_buffers(&mut self) {
        self.satellites.clear();
        self.signals.clear();
        self.signal_index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sat(sv_id: u8, elevation_deg: f64, cn0: f64) -> SatelliteSample {
        SatelliteSample {
            gnss_id: 0,
            sv_id,
            elevation_deg,
            azimuth_deg: 90.0,
            cn0,
            pseudorange_residual: Some(0.5),
        }
    }

    fn sig(sv_id: u8, freq_id: u8) -> SignalSample {
        SignalSample::new(0, sv_id, freq_id, 0, 40.0, Some(7))
    }

    fn slip(sv_id: u8, has_cycle_slip: bool) -> CycleSlipFlag {
        CycleSlipFlag {
            gnss_id: 0,
            sv_id,
            has_cycle_slip,
        }
    }

    #[test]
    fn test_first_tag_is_adopted() {
        let mut acc = EpochAccumulator::new("a", EpochClock::SatelliteSnapshot);
        assert_eq!(acc.current_epoch(), None);

        acc.ingest_satellite_snapshot(vec![sat(1, 45.0, 40.0)], 1000);
        assert_eq!(acc.current_epoch(), Some(1000));

        acc.ingest_signal_snapshot(vec![sig(1, 0)], 2000);
        assert_eq!(acc.current_epoch(), Some(1000));
    }

    #[test]
    fn test_maybe_flush_without_open_epoch() {
        let mut acc = EpochAccumulator::new("a", EpochClock::default());
        assert!(acc.maybe_flush(500).is_none());
        assert_eq!(acc.current_epoch(), Some(500));
    }

    #[test]
    fn test_boundary_emits_closing_epoch() {
        let mut acc = EpochAccumulator::new("a", EpochClock::SatelliteSnapshot);
        acc.ingest_satellite_snapshot(vec![sat(1, 80.0, 40.0), sat(2, 10.0, 45.0)], 1000);
        acc.ingest_signal_snapshot(vec![sig(1, 0), sig(1, 1), sig(2, 0)], 1000);
        assert!(acc.maybe_flush(1000).is_none());

        let features = acc.maybe_flush(2000).expect("epoch should close");
        assert_eq!(features.time_of_week_ms, 1000);
        assert_eq!(features.num_tracked, 2);
        assert_eq!(features.label, "a");

        assert_eq!(acc.current_epoch(), Some(2000));
        assert!(acc.satellites().is_empty());
        assert!(acc.signals().is_empty());
    }

    #[test]
    fn test_repeated_flush_is_noop() {
        let mut acc = EpochAccumulator::new("a", EpochClock::default());
        acc.ingest_satellite_snapshot(vec![sat(1, 45.0, 40.0)], 1000);
        assert!(acc.maybe_flush(2000).is_some());
        assert!(acc.maybe_flush(2000).is_none());
        assert!(acc.maybe_flush(2000).is_none());
    }

    #[test]
    fn test_snapshots_replace_buffers() {
        let mut acc = EpochAccumulator::new("a", EpochClock::default());
        acc.ingest_satellite_snapshot(vec![sat(1, 45.0, 40.0), sat(2, 45.0, 40.0)], 1000);
        acc.ingest_satellite_snapshot(vec![sat(3, 45.0, 40.0)], 1000);
        assert_eq!(acc.satellites().len(), 1);
        assert_eq!(acc.satellites()[0].sv_id, 3);

        acc.ingest_signal_snapshot(vec![sig(1, 0), sig(1, 1)], 1000);
        acc.ingest_signal_snapshot(vec![sig(3, 0)], 1000);
        assert_eq!(acc.signals().len(), 1);
    }

    #[test]
    fn test_signal_elevation_is_copied() {
        let mut acc = EpochAccumulator::new("a", EpochClock::default());
        acc.ingest_satellite_snapshot(vec![sat(1, 62.0, 40.0)], 1000);
        acc.ingest_signal_snapshot(vec![sig(1, 0), sig(9, 0)], 1000);

        assert_eq!(acc.signals()[0].elevation_deg, Some(62.0));
        assert_eq!(acc.signals()[1].elevation_deg, None);
    }

    #[test]
    fn test_cycle_slip_first_match_wins() {
        let mut acc = EpochAccumulator::new("a", EpochClock::SatelliteSnapshot);
        acc.ingest_signal_snapshot(vec![sig(1, 0), sig(1, 1), sig(2, 0)], 1000);
        acc.ingest_cycle_slip_update(&[slip(1, true), slip(7, true)], 1000);

        assert!(acc.signals()[0].has_cycle_slip);
        assert!(!acc.signals()[1].has_cycle_slip);
        assert!(!acc.signals()[2].has_cycle_slip);

        acc.ingest_cycle_slip_update(&[slip(1, false)], 1000);
        assert!(!acc.signals()[0].has_cycle_slip);
    }

    #[test]
    fn test_cycle_slip_without_signals_is_ignored() {
        let mut acc = EpochAccumulator::new("a", EpochClock::SatelliteSnapshot);
        acc.ingest_cycle_slip_update(&[slip(1, true)], 1000);
        assert!(acc.signals().is_empty());
        assert_eq!(acc.current_epoch(), Some(1000));
    }

    #[test]
    fn test_dop_persists_across_epochs() {
        let mut acc = EpochAccumulator::new("a", EpochClock::default());
        acc.ingest_dop(1.4, 0.8);
        acc.ingest_satellite_snapshot(vec![sat(1, 45.0, 40.0)], 1000);

        let first = acc.maybe_flush(2000).unwrap();
        assert_eq!(first.pdop, Some(1.4));

        acc.ingest_satellite_snapshot(vec![sat(1, 45.0, 40.0)], 2000);
        let second = acc.maybe_flush(3000).unwrap();
        assert_eq!(second.pdop, Some(1.4));
        assert_eq!(second.tdop, Some(0.8));
    }

    #[test]
    fn test_ingest_routes_by_clock() {
        let mut acc = EpochAccumulator::new("a", EpochClock::CycleSlipUpdate);

        let emitted = acc.ingest(TelemetryBatch::SatelliteSnapshot {
            time_tag: 1000,
            satellites: vec![sat(1, 45.0, 40.0)],
        });
        assert!(emitted.is_none());
        assert!(acc
            .ingest(TelemetryBatch::SignalSnapshot {
                time_tag: 1000,
                signals: vec![sig(1, 0), sig(1, 1)],
            })
            .is_none());
        assert!(acc
            .ingest(TelemetryBatch::CycleSlipUpdate {
                time_tag: 1000,
                flags: vec![slip(1, true)],
            })
            .is_none());

        // A satellite snapshot with a new tag is not the clock
        assert!(acc
            .ingest(TelemetryBatch::SatelliteSnapshot {
                time_tag: 2000,
                satellites: vec![sat(2, 45.0, 40.0)],
            })
            .is_none());
        assert_eq!(acc.current_epoch(), Some(1000));

        let features = acc
            .ingest(TelemetryBatch::CycleSlipUpdate {
                time_tag: 2000,
                flags: vec![],
            })
            .expect("clock batch should close the epoch");
        assert_eq!(features.time_of_week_ms, 1000);
        assert_eq!(features.num_tracked, 1);
        assert_eq!(acc.current_epoch(), Some(2000));
    }

    #[test]
    fn test_clock_batch_lands_in_new_epoch() {
        let mut acc = EpochAccumulator::new("a", EpochClock::SatelliteSnapshot);
        acc.ingest(TelemetryBatch::SatelliteSnapshot {
            time_tag: 1000,
            satellites: vec![sat(1, 45.0, 40.0)],
        });
        let closed = acc.ingest(TelemetryBatch::SatelliteSnapshot {
            time_tag: 2000,
            satellites: vec![sat(2, 45.0, 40.0), sat(3, 45.0, 40.0)],
        });

        assert_eq!(closed.map(|f| f.num_tracked), Some(1));
        assert_eq!(acc.open_epoch().satellite_count, 2);
        assert_eq!(acc.open_epoch().time_tag, Some(2000));
    }

    #[test]
    fn test_finish_discards_open_epoch() {
        let mut acc = EpochAccumulator::new("a", EpochClock::default());
        acc.ingest_satellite_snapshot(vec![sat(1, 45.0, 40.0)], 1000);
        acc.ingest_signal_snapshot(vec![sig(1, 0)], 1000);

        assert_eq!(acc.finish(), 2);
        assert_eq!(acc.current_epoch(), None);
        assert!(acc.satellites().is_empty());
    }
}
