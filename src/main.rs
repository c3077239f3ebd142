//! GNSS Mount Eval CLI
//!
//! Collects per-epoch quality features from decoded receiver telemetry and
//! scores recorded sessions.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gnss_mount_eval::{
    collector::{open_source, Collector, CollectorConfig, EpochClock},
    config::Config,
    core::{
        score_all,
        table::{read_features_file, write_scores_file},
        EpochAccumulator, EpochFeatures, FeatureTableWriter, Scores,
    },
    session_log::{create_shared_log_with_persistence, log::PersistedStats, SessionLog},
    VERSION,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mount-eval")]
#[command(version = VERSION)]
#[command(about = "GNSS antenna and mounting quality evaluation", long_about = None)]
struct Cli {
    /// Log filter (overrides RUST_LOG), e.g. "info" or "gnss_mount_eval=debug"
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Turn decoded telemetry batches into a per-epoch feature table
    Collect {
        /// Session label stamped on every row
        #[arg(long)]
        label: Option<String>,

        /// Output feature table (defaults to <export_path>/<label>.csv)
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// JSON-lines batch source; stdin when omitted or "-"
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Batch category that closes epochs (cycle-slip, satellite, signal)
        #[arg(long)]
        clock: Option<String>,
    },

    /// Score one or more feature tables per label
    Analyze {
        /// Feature tables to read
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Score table to write (defaults to <first file>.scores.csv)
        #[arg(long, short)]
        out: Option<PathBuf>,
    },

    /// Show configuration and cumulative run statistics
    Status,

    /// Show configuration, optionally updating score weights
    Config {
        /// Set a summary weight and save, e.g. --set-weight sky_view=1.5
        #[arg(long, value_name = "NAME=VALUE")]
        set_weight: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    let result = match cli.command {
        Commands::Collect {
            label,
            out,
            input,
            clock,
        } => cmd_collect(label, out, input.as_deref(), clock.as_deref()),
        Commands::Analyze { files, out } => cmd_analyze(&files, out),
        Commands::Status => cmd_status(),
        Commands::Config { set_weight } => cmd_config(&set_weight),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config() -> Result<Config> {
    Config::load().context("loading configuration")
}

fn cmd_collect(
    label: Option<String>,
    out: Option<PathBuf>,
    input: Option<&Path>,
    clock: Option<&str>,
) -> Result<()> {
    let config = load_config()?;
    let label = label.unwrap_or_else(|| config.default_label.clone());
    let clock = match clock {
        Some(name) => EpochClock::from_name(name)
            .with_context(|| format!("unknown epoch clock category: {name}"))?,
        None => config.epoch_clock,
    };
    if let Err(e) = config.ensure_directories() {
        tracing::warn!(error = %e, "could not create data directories");
    }
    let out = out.unwrap_or_else(|| config.feature_table_path(&label));
    let out = out.as_path();

    println!("GNSS Mount Eval v{VERSION}");
    println!();
    println!("Collecting features for label '{label}'");
    println!(
        "  Input: {}",
        input.map_or_else(|| "stdin".to_string(), |p| p.display().to_string())
    );
    println!("  Output: {}", out.display());
    println!("  Epoch clock: {clock:?}");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let session_log = create_shared_log_with_persistence(config.session_log_path());

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut writer = FeatureTableWriter::create(out)
        .with_context(|| format!("creating feature table {}", out.display()))?;

    let mut collector = Collector::new(CollectorConfig {
        channel_capacity: config.channel_capacity,
    })
    .with_session_log(Arc::clone(&session_log));
    let source = open_source(input).context("opening telemetry source")?;
    collector.start(source).context("starting collector")?;

    let running = Arc::new(AtomicBool::new(true));
    ctrlc_handler(Arc::clone(&running))?;

    let mut accumulator = EpochAccumulator::new(label, clock);
    let receiver = collector.receiver().clone();
    let mut last_batch = Instant::now();
    let mut stalled = false;

    while running.load(Ordering::SeqCst) {
        match receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(batch) => {
                session_log.record_batch(batch.category());
                last_batch = Instant::now();
                stalled = false;

                if let Some(features) = accumulator.ingest(batch) {
                    record_epoch(&mut writer, &session_log, &features)?;

                    println!(
                        "[{}] Epoch {} closed: {} tracked, C/N0 {:.1} dB-Hz, dual-band {:.0}%",
                        Utc::now().format("%H:%M:%S"),
                        features.time_of_week_ms,
                        features.num_tracked,
                        features.mean_cn0,
                        features.dual_band_frac * 100.0
                    );
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if !stalled && last_batch.elapsed() >= config.stall_warning {
                    tracing::warn!(
                        secs = last_batch.elapsed().as_secs(),
                        "no telemetry received"
                    );
                    stalled = true;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    println!();
    if running.load(Ordering::SeqCst) {
        if let Some(stats) = collector.join() {
            println!(
                "End of input: {} lines, {} batches, {} malformed",
                stats.lines, stats.batches, stats.malformed
            );
        }
    } else {
        println!("Stopping collection...");
        collector.stop();
    }

    let dropped = accumulator.finish();
    if dropped > 0 {
        println!("Discarded unterminated final epoch ({dropped} samples)");
    }

    save_run_stats(&session_log);

    println!("Wrote {} rows to {}", writer.rows_written(), out.display());
    println!();
    println!("{}", session_log.summary());
    Ok(())
}

/// Append one closed epoch to the feature table.
///
/// A failed write ends the run, so the counts gathered so far are saved first.
fn record_epoch<W: Write>(
    writer: &mut FeatureTableWriter<W>,
    session_log: &SessionLog,
    features: &EpochFeatures,
) -> Result<()> {
    session_log.record_epoch_emitted();
    if let Err(e) = writer.write(features) {
        save_run_stats(session_log);
        return Err(e).context("writing feature row");
    }
    session_log.record_row_written();
    Ok(())
}

fn save_run_stats(session_log: &SessionLog) {
    if let Err(e) = session_log.save() {
        tracing::warn!(error = %e, "could not save run statistics");
    }
}

fn cmd_analyze(files: &[PathBuf], out: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;

    let mut rows = Vec::new();
    for file in files {
        let table = read_features_file(file)
            .with_context(|| format!("reading feature table {}", file.display()))?;
        tracing::debug!(file = %file.display(), rows = table.len(), "loaded feature table");
        rows.extend(table);
    }
    if rows.is_empty() {
        bail!("no feature rows found in {} file(s)", files.len());
    }

    let scores = score_all(&rows, &config.weights);
    print_ratings(&scores);

    let out = match (out, files.first()) {
        (Some(out), _) => out,
        (None, Some(first)) => first.with_extension("scores.csv"),
        (None, None) => bail!("no input files"),
    };
    write_scores_file(&out, &scores)
        .with_context(|| format!("writing score table {}", out.display()))?;

    println!();
    println!("Wrote scores: {}", out.display());
    Ok(())
}

fn print_ratings(scores: &[Scores]) {
    println!();
    println!("Antenna Ratings (1–10)");
    println!("{}", "-".repeat(88));
    println!(
        "{:18} {:>12} {:>6} {:>9} {:>8} {:>7} {:>8} {:>5} {:>8}",
        "label", "availability", "cn0", "multipath", "dualBand", "skyView", "geometry", "lock",
        "summary"
    );
    for s in scores {
        println!(
            "{:18} {:12.2} {:6.2} {:9.2} {:8.2} {:7.2} {:8.2} {:5.2} {:8.2}",
            s.label,
            s.satellite_availability,
            s.signal_quality,
            s.multipath_resistance,
            s.dual_band_coverage,
            s.sky_view,
            s.geometry_quality,
            s.lock_continuity,
            s.summary_score
        );
    }
}

fn cmd_status() -> Result<()> {
    let config = load_config()?;

    println!("GNSS Mount Eval Status");
    println!("======================");
    println!();
    println!("Configuration:");
    println!("  Default label: {}", config.default_label);
    println!("  Epoch clock: {:?}", config.epoch_clock);
    println!("  Export path: {}", config.export_path.display());
    println!("  Stall warning: {}s", config.stall_warning.as_secs());
    println!();

    match PersistedStats::read(&config.session_log_path()) {
        Ok(Some(stats)) => {
            println!("Cumulative Statistics:");
            println!("  Runs: {}", stats.runs);
            println!("  Batches ingested: {}", stats.batches);
            println!("  Malformed lines: {}", stats.malformed_lines);
            println!("  Epochs emitted: {}", stats.epochs_emitted);
            println!("  Rows written: {}", stats.rows_written);
            if let Some(updated) = stats.last_updated {
                println!("  Last run: {}", updated.format("%Y-%m-%d %H:%M:%S UTC"));
            }
        }
        Ok(None) => println!("No previous run data found."),
        Err(e) => tracing::warn!(error = %e, "could not read run statistics"),
    }
    Ok(())
}

fn cmd_config(set_weight: &[String]) -> Result<()> {
    let mut config = load_config()?;

    if !set_weight.is_empty() {
        for assignment in set_weight {
            let (name, value) = assignment
                .split_once('=')
                .with_context(|| format!("expected NAME=VALUE, got '{assignment}'"))?;
            let value: f64 = value
                .trim()
                .parse()
                .with_context(|| format!("invalid weight value '{value}'"))?;
            config
                .set_weight(name, value)
                .with_context(|| format!("setting weight {name}"))?;
        }
        config.save().context("saving configuration")?;
        tracing::info!(path = %Config::config_path().display(), "configuration saved");
    }

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", Config::config_path().display());
    println!();
    println!(
        "{}",
        serde_json::to_string_pretty(&config).context("serializing configuration")?
    );
    Ok(())
}

/// Set up Ctrl+C handler.
fn ctrlc_handler(running: Arc<AtomicBool>) -> Result<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .context("setting Ctrl+C handler")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gnss_mount_eval::core::build;

    /// Accepts nothing; every flush fails.
    struct FullDisk;

    impl Write for FullDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("no space left on device"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Err(std::io::Error::other("no space left on device"))
        }
    }

    #[test]
    fn test_failed_row_write_keeps_run_stats() {
        let dir = std::env::temp_dir()
            .join(format!("gnss-mount-eval-main-{}", uuid::Uuid::new_v4()));
        let path = dir.join("session_log.json");
        let session_log = SessionLog::with_persistence(path.clone());
        let features = build(&[], &[], None, None, "roof", 1000);

        let mut ok = FeatureTableWriter::new(Vec::new());
        record_epoch(&mut ok, &session_log, &features).unwrap();
        assert!(!path.exists());

        let mut failing = FeatureTableWriter::new(FullDisk);
        assert!(record_epoch(&mut failing, &session_log, &features).is_err());

        let saved = PersistedStats::read(&path).unwrap().unwrap();
        assert_eq!(saved.runs, 1);
        assert_eq!(saved.epochs_emitted, 2);
        assert_eq!(saved.rows_written, 1);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
