//! Configuration for GNSS mount evaluation.

use crate::collector::types::EpochClock;
use crate::core::scoring::ScoreWeights;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Label used by `collect` when none is given
    pub default_label: String,

    /// Batch category that closes epochs
    pub epoch_clock: EpochClock,

    /// Component weights for the summary score
    pub weights: ScoreWeights,

    /// Directory for feature and score tables
    pub export_path: PathBuf,

    /// Directory for run statistics
    pub data_path: PathBuf,

    /// Capacity of the batch queue between reader and accumulator
    pub channel_capacity: usize,

    /// Warn when no batch arrives for this long
    #[serde(with = "duration_serde")]
    pub stall_warning: Duration,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gnss-mount-eval");

        Self {
            default_label: "antenna".to_string(),
            epoch_clock: EpochClock::default(),
            weights: ScoreWeights::default(),
            export_path: data_dir.join("exports"),
            data_path: data_dir,
            channel_capacity: 10_000,
            stall_warning: Duration::from_secs(5),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `config_path`, or defaults if it does not exist.
    pub fn load_from(config_path: &Path) -> Result<Self, ConfigError> {
        if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::IoError(e.to_string()))?;
            Self::from_json(&content)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse and validate a JSON configuration.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config =
            serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to `config_path`.
    pub fn save_to(&self, config_path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(config_path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gnss-mount-eval")
            .join("config.json")
    }

    /// Default feature table for a collection run.
    pub fn feature_table_path(&self, label: &str) -> PathBuf {
        self.export_path.join(format!("{label}.csv"))
    }

    /// Set one summary weight by name, e.g. `multipath_resistance`.
    ///
    /// The updated configuration must still validate.
    pub fn set_weight(&mut self, name: &str, value: f64) -> Result<(), ConfigError> {
        let mut weights = self.weights;
        let slot = match name.trim().replace('-', "_").as_str() {
            "satellite_availability" => &mut weights.satellite_availability,
            "signal_quality" => &mut weights.signal_quality,
            "multipath_resistance" => &mut weights.multipath_resistance,
            "dual_band_coverage" => &mut weights.dual_band_coverage,
            "sky_view" => &mut weights.sky_view,
            "geometry_quality" => &mut weights.geometry_quality,
            "lock_continuity" => &mut weights.lock_continuity,
            other => return Err(ConfigError::Invalid(format!("unknown weight: {other}"))),
        };
        *slot = value;

        let previous = std::mem::replace(&mut self.weights, weights);
        if let Err(e) = self.validate() {
            self.weights = previous;
            return Err(e);
        }
        Ok(())
    }

    /// Path of the cumulative run statistics.
    pub fn session_log_path(&self) -> PathBuf {
        self.data_path.join("session_log.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.export_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject weights the summary score cannot use.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let weights = self.weights.as_array();
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(ConfigError::Invalid(
                "score weights must be finite and non-negative".to_string(),
            ));
        }
        if self.weights.total() <= 0.0 {
            return Err(ConfigError::Invalid(
                "at least one score weight must be positive".to_string(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::Invalid(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
