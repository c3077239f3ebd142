//! End-to-end tests: replayed telemetry to feature tables to scores

use gnss_mount_eval::collector::{CollectorConfig, EpochClock, ReplayCollector};
use gnss_mount_eval::core::table::{read_features_file, write_scores_file};
use gnss_mount_eval::core::{score_all, EpochAccumulator, FeatureTableWriter, ScoreWeights};
use gnss_mount_eval::session_log::create_shared_log;
use std::io::Cursor;
use std::path::PathBuf;
use std::time::Duration;

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "gnss-mount-eval-{name}-{}",
        uuid::Uuid::new_v4()
    ));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

/// Three epochs of satellite, signal and cycle-slip batches. The last epoch
/// is never closed.
fn session(dop: &str, slip_in_first: bool) -> String {
    let mut lines = vec![dop.to_string()];
    for (tag, slip) in [(1000, slip_in_first), (2000, false), (3000, false)] {
        lines.push(format!(
            r#"{{"category":"satellite_snapshot","time_tag":{tag},"satellites":[{{"gnss_id":0,"sv_id":5,"elevation_deg":72.0,"azimuth_deg":140.0,"cn0":44.0,"pseudorange_residual":0.5}},{{"gnss_id":0,"sv_id":7,"elevation_deg":30.0,"azimuth_deg":250.0,"cn0":38.0,"pseudorange_residual":-1.5}}]}}"#
        ));
        lines.push(format!(
            r#"{{"category":"signal_snapshot","time_tag":{tag},"signals":[{{"gnss_id":0,"sv_id":5,"freq_id":0,"signal_id":0,"cn0":44.0,"quality_ind":7}},{{"gnss_id":0,"sv_id":5,"freq_id":1,"signal_id":3,"cn0":41.0,"quality_ind":7}},{{"gnss_id":0,"sv_id":7,"freq_id":0,"signal_id":0,"cn0":38.0,"quality_ind":5}}]}}"#
        ));
        lines.push(format!(
            r#"{{"category":"cycle_slip_update","time_tag":{tag},"flags":[{{"gnss_id":0,"sv_id":5,"has_cycle_slip":false}},{{"gnss_id":0,"sv_id":7,"has_cycle_slip":{slip}}}]}}"#
        ));
    }
    lines.push("garbage line".to_string());
    lines.join("\n")
}

/// Replay `input` through a collector and accumulator into a CSV at `out`.
fn collect(input: String, label: &str, out: &PathBuf) -> (u64, u64) {
    let log = create_shared_log();
    let mut collector =
        ReplayCollector::new(CollectorConfig::default()).with_session_log(log.clone());
    collector.start(Cursor::new(input)).unwrap();

    let mut acc = EpochAccumulator::new(label, EpochClock::SatelliteSnapshot);
    let mut writer = FeatureTableWriter::create(out).unwrap();

    while let Ok(batch) = collector.receiver().recv_timeout(Duration::from_secs(5)) {
        log.record_batch(batch.category());
        if let Some(features) = acc.ingest(batch) {
            writer.write(&features).unwrap();
            log.record_row_written();
        }
    }
    let stats = collector.join().unwrap();
    acc.finish();

    assert_eq!(log.stats().rows_written, writer.rows_written());
    (writer.rows_written(), stats.malformed)
}

#[test]
fn test_replay_to_feature_table() {
    let dir = test_dir("features");
    let out = dir.join("roof.csv");

    let (rows, malformed) = collect(
        session(r#"{"category":"dop","pdop":1.2,"tdop":0.9}"#, true),
        "roof",
        &out,
    );
    assert_eq!(rows, 2);
    assert_eq!(malformed, 1);

    let table = read_features_file(&out).unwrap();
    assert_eq!(table.len(), 2);

    let first = &table[0];
    assert_eq!(first.label, "roof");
    assert_eq!(first.time_of_week_ms, 1000);
    assert_eq!(first.num_tracked, 2);
    assert!((first.mean_cn0 - 41.0).abs() < 1e-9);
    assert!((first.frac_above_70 - 0.5).abs() < 1e-9);
    assert!((first.mean_abs_pr_res - 1.0).abs() < 1e-9);
    assert!((first.dual_band_frac - 0.5).abs() < 1e-9);
    assert!((first.no_slip_frac - 2.0 / 3.0).abs() < 1e-6);
    assert_eq!(first.pdop, Some(1.2));
    assert_eq!(first.tdop, Some(0.9));

    // DOP persists into later epochs; the slip did not.
    let second = &table[1];
    assert_eq!(second.time_of_week_ms, 2000);
    assert_eq!(second.pdop, Some(1.2));
    assert!((second.no_slip_frac - 1.0).abs() < 1e-9);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_missing_dop_round_trips_as_empty() {
    let dir = test_dir("nodop");
    let out = dir.join("mast.csv");

    // A blank first line instead of a DOP batch
    collect(session("", false), "mast", &out);

    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.starts_with("label,utcTowMs,numTracked"));

    let table = read_features_file(&out).unwrap();
    assert!(table.iter().all(|r| r.pdop.is_none() && r.tdop.is_none()));

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn test_analyze_multiple_tables() {
    let dir = test_dir("analyze");
    let roof = dir.join("roof.csv");
    let mast = dir.join("mast.csv");

    collect(
        session(r#"{"category":"dop","pdop":1.2,"tdop":0.9}"#, true),
        "roof",
        &roof,
    );
    collect(session("", false), "mast", &mast);

    let mut rows = read_features_file(&roof).unwrap();
    rows.extend(read_features_file(&mast).unwrap());

    let scores = score_all(&rows, &ScoreWeights::default());
    let labels: Vec<&str> = scores.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["mast", "roof"]);

    for s in &scores {
        for component in s.components() {
            assert!((1.0..=10.0).contains(&component));
        }
        assert!((1.0..=10.0).contains(&s.summary_score));
    }

    // Identical sky, but only roof saw a cycle slip and reported DOP
    let mast_scores = &scores[0];
    let roof_scores = &scores[1];
    assert!((roof_scores.dual_band_coverage - 6.625).abs() < 1e-9);
    assert!((mast_scores.dual_band_coverage - roof_scores.dual_band_coverage).abs() < 1e-9);
    assert!(mast_scores.lock_continuity > roof_scores.lock_continuity);

    let scores_path = roof.with_extension("scores.csv");
    write_scores_file(&scores_path, &scores).unwrap();
    let written = std::fs::read_to_string(&scores_path).unwrap();
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("label,satelliteAvailability,signalQuality,multipathResistance,dualBandCoverage,skyView,geometryQuality,lockContinuity,summaryScore")
    );
    assert!(lines.next().is_some_and(|l| l.starts_with("mast,")));
    assert!(lines.next().is_some_and(|l| l.starts_with("roof,")));

    let _ = std::fs::remove_dir_all(&dir);
}
