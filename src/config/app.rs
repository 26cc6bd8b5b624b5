//! Application configuration structures.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::lifecycle::DurationPolicy;
use crate::probe::HttpSpeedConfig;
use crate::storage::SampleKind;

use super::validation::{ConfigError, expand_env_vars, require_at_most, require_positive};

// =============================================================================
// Constants
// =============================================================================

/// Default bounded run length, in minutes.
pub const DEFAULT_ANALYSIS_MINUTES: u64 = 60;

/// Default cadence of both jobs, in minutes.
pub const DEFAULT_FREQUENCY_MINUTES: u64 = 1;

/// Default number of samples between x-axis labels.
pub const DEFAULT_XTICK_INTERVAL: usize = 5;

/// Longest bounded run and longest cadence, in minutes (one year).
pub const MAX_MINUTES: u64 = 365 * 24 * 60;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "configs/config.yaml";

// =============================================================================
// Analysis Configuration
// =============================================================================

/// What to measure, how often and for how long.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Run length in minutes (default: 60). Ignored when `infinite_analysis`.
    pub analysis_duration: u64,

    /// Run until interrupted (default: false).
    pub infinite_analysis: bool,

    /// Measure download/upload speed (default: true).
    pub analyze_speed: bool,

    /// Record interface byte counters (default: true).
    pub analyze_usage: bool,

    /// Minutes between measurements (default: 1).
    pub frequency: u64,

    /// Samples between x-axis labels in the report (default: 5).
    pub xtick_interval: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_duration: DEFAULT_ANALYSIS_MINUTES,
            infinite_analysis: false,
            analyze_speed: true,
            analyze_usage: true,
            frequency: DEFAULT_FREQUENCY_MINUTES,
            xtick_interval: DEFAULT_XTICK_INTERVAL,
        }
    }
}

impl AnalysisConfig {
    /// Validate the analysis settings.
    ///
    /// # Errors
    /// Returns `ConfigError::NoAnalysisSelected` if both kinds are disabled,
    /// `ConfigError::ValidationError` for out-of-range values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.analyze_speed && !self.analyze_usage {
            return Err(ConfigError::NoAnalysisSelected);
        }

        require_positive("analysis_duration", self.analysis_duration)?;
        require_positive("frequency", self.frequency)?;
        require_at_most("frequency", self.frequency, MAX_MINUTES)?;
        if !self.infinite_analysis {
            require_at_most("analysis_duration", self.analysis_duration, MAX_MINUTES)?;
        }
        require_positive("xtick_interval", self.xtick_interval as u64)?;

        // Every job gets at least one tick in a bounded run
        if !self.infinite_analysis && self.frequency > self.analysis_duration {
            return Err(ConfigError::ValidationError(format!(
                "frequency ({} min) exceeds analysis_duration ({} min)",
                self.frequency, self.analysis_duration
            )));
        }

        for job in self.job_configs() {
            job.validate()?;
        }

        Ok(())
    }

    /// Duration policy of the run.
    pub fn duration_policy(&self) -> DurationPolicy {
        if self.infinite_analysis {
            DurationPolicy::Unbounded
        } else {
            DurationPolicy::Bounded(minutes(self.analysis_duration))
        }
    }

    /// Per-job settings, speed first.
    pub fn job_configs(&self) -> Vec<JobConfig> {
        vec![
            JobConfig {
                kind: SampleKind::Speed,
                cadence_minutes: self.frequency,
                enabled: self.analyze_speed,
            },
            JobConfig {
                kind: SampleKind::Usage,
                cadence_minutes: self.frequency,
                enabled: self.analyze_usage,
            },
        ]
    }

    /// Kinds that take part in the run.
    pub fn enabled_kinds(&self) -> Vec<SampleKind> {
        self.job_configs()
            .into_iter()
            .filter(|j| j.enabled)
            .map(|j| j.kind)
            .collect()
    }
}

/// Settings of a single job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobConfig {
    pub kind: SampleKind,
    pub cadence_minutes: u64,
    pub enabled: bool,
}

impl JobConfig {
    /// Interval between ticks.
    pub fn cadence(&self) -> Duration {
        minutes(self.cadence_minutes)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.enabled {
            let field = format!("{} cadence", self.kind);
            require_positive(&field, self.cadence_minutes)?;
            require_at_most(&field, self.cadence_minutes, MAX_MINUTES)?;
        }
        Ok(())
    }
}

fn minutes(value: u64) -> Duration {
    Duration::from_secs(value.saturating_mul(60))
}

// =============================================================================
// Paths & Logging
// =============================================================================

/// Output directories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Record tables and reports (default: "results").
    pub results_dir: PathBuf,

    /// Run and per-job logs (default: "logs").
    pub logs_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("results"),
            logs_dir: PathBuf::from("logs"),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console filter used when `RUST_LOG` is unset (default: "info").
    pub level: String,

    /// Write run and per-job log files (default: true).
    pub files: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            files: true,
        }
    }
}

// =============================================================================
// Application Configuration
// =============================================================================

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Analysis settings.
    pub analysis: AnalysisConfig,

    /// Output directories.
    pub paths: PathsConfig,

    /// HTTP speed probe endpoints.
    pub speed_probe: HttpSpeedConfig,

    /// Logging settings.
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file.
    ///
    /// `${VAR}` and `${VAR:-default}` are expanded before parsing. A missing
    /// file yields the defaults; the result is not validated so that CLI
    /// overrides can be applied first.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding environment variables.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(&expand_env_vars(content))?)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.analysis.validate()?;

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "logging level must not be empty".to_string(),
            ));
        }

        if self.analysis.analyze_speed {
            self.speed_probe
                .validate()
                .map_err(|e| ConfigError::ValidationError(format!("speed_probe: {e}")))?;
        }

        Ok(())
    }
}
