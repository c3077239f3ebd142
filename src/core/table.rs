//! CSV tables for epoch features and per-label scores.
//!
//! Feature rows use a fixed column order and fixed decimal precision:
//! 3 decimals for magnitudes (C/N0, residuals, DOP), 6 for fractions.
//! Unset DOP values are written as empty fields and read back as `None`.

use crate::core::features::EpochFeatures;
use crate::core::scoring::Scores;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Column order of feature tables.
pub const FEATURE_COLUMNS: [&str; 12] = [
    "label",
    "utcTowMs",
    "numTracked",
    "meanCn0",
    "fracAbove70",
    "elevWeightedCoverage",
    "meanAbsPrRes",
    "highElevCn0Std",
    "dualBandFrac",
    "pdop",
    "tdop",
    "noSlipFrac",
];

/// Column order of score tables.
pub const SCORE_COLUMNS: [&str; 9] = [
    "label",
    "satelliteAvailability",
    "signalQuality",
    "multipathResistance",
    "dualBandCoverage",
    "skyView",
    "geometryQuality",
    "lockContinuity",
    "summaryScore",
];

/// Errors reading or writing tables.
#[derive(Debug)]
pub enum TableError {
    Io(std::io::Error),
    Csv(csv::Error),
    MissingColumn(String),
}

impl std::fmt::Display for TableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TableError::Io(e) => write!(f, "IO error: {e}"),
            TableError::Csv(e) => write!(f, "CSV error: {e}"),
            TableError::MissingColumn(c) => write!(f, "Missing column: {c}"),
        }
    }
}

impl std::error::Error for TableError {}

impl From<std::io::Error> for TableError {
    fn from(e: std::io::Error) -> Self {
        TableError::Io(e)
    }
}

impl From<csv::Error> for TableError {
    fn from(e: csv::Error) -> Self {
        TableError::Csv(e)
    }
}

fn opt3(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.3}")).unwrap_or_default()
}

/// Format one feature row as CSV fields, in [`FEATURE_COLUMNS`] order.
pub fn feature_fields(f: &EpochFeatures) -> [String; 12] {
    [
        f.label.clone(),
        f.time_of_week_ms.to_string(),
        f.num_tracked.to_string(),
        format!("{:.3}", f.mean_cn0),
        format!("{:.6}", f.frac_above_70),
        format!("{:.6}", f.elev_weighted_coverage),
        format!("{:.3}", f.mean_abs_pr_res),
        format!("{:.3}", f.high_elev_cn0_std),
        format!("{:.6}", f.dual_band_frac),
        opt3(f.pdop),
        opt3(f.tdop),
        format!("{:.6}", f.no_slip_frac),
    ]
}

/// Format one score row as CSV fields, in [`SCORE_COLUMNS`] order.
pub fn score_fields(s: &Scores) -> [String; 9] {
    [
        s.label.clone(),
        format!("{:.2}", s.satellite_availability),
        format!("{:.2}", s.signal_quality),
        format!("{:.2}", s.multipath_resistance),
        format!("{:.2}", s.dual_band_coverage),
        format!("{:.2}", s.sky_view),
        format!("{:.2}", s.geometry_quality),
        format!("{:.2}", s.lock_continuity),
        format!("{:.2}", s.summary_score),
    ]
}

/// Streaming writer for feature rows.
///
/// The header is written lazily, just before the first row, so a run that
/// never closes an epoch leaves an empty file.
pub struct FeatureTableWriter<W: Write> {
    writer: csv::Writer<W>,
    wrote_header: bool,
    rows: u64,
}

impl FeatureTableWriter<File> {
    /// Create (or truncate) a feature table at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, TableError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: Write> FeatureTableWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(inner),
            wrote_header: false,
            rows: 0,
        }
    }

    /// Append one row and flush it through.
    pub fn write(&mut self, features: &EpochFeatures) -> Result<(), TableError> {
        if !self.wrote_header {
            self.writer.write_record(FEATURE_COLUMNS)?;
            self.wrote_header = true;
        }
        self.writer.write_record(feature_fields(features))?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(())
    }

    pub fn rows_written(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> Result<W, TableError> {
        self.writer
            .into_inner()
            .map_err(|e| TableError::Io(e.into_error()))
    }
}

/// Read every feature row from a CSV source with a header line.
///
/// Columns are matched by name, so extra columns are ignored.
pub fn read_features<R: Read>(reader: R) -> Result<Vec<EpochFeatures>, TableError> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);

    let headers = rdr.headers()?.clone();
    for column in FEATURE_COLUMNS {
        if !headers.iter().any(|h| h == column) {
            return Err(TableError::MissingColumn(column.to_string()));
        }
    }

    let mut rows = Vec::new();
    for record in rdr.deserialize() {
        rows.push(record?);
    }
    Ok(rows)
}

/// Read feature rows from a file. An empty file holds no rows.
pub fn read_features_file(path: impl AsRef<Path>) -> Result<Vec<EpochFeatures>, TableError> {
    let file = File::open(path.as_ref())?;
    if file.metadata()?.len() == 0 {
        return Ok(Vec::new());
    }
    read_features(file)
}

/// Write a complete score table with header.
pub fn write_scores<W: Write>(writer: W, scores: &[Scores]) -> Result<(), TableError> {
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    wtr.write_record(SCORE_COLUMNS)?;
    for s in scores {
        wtr.write_record(score_fields(s))?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_scores_file(path: impl AsRef<Path>, scores: &[Scores]) -> Result<(), TableError> {
    write_scores(File::create(path)?, scores)
}
