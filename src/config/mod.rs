//! Configuration module for netpulse.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Analysis settings (duration, frequency, which measurements to take)
//! - Output directories for record tables and logs
//! - HTTP speed probe endpoints
//! - Logging level

mod app;
mod validation;

pub use app::{AnalysisConfig, AppConfig, JobConfig, LoggingConfig, PathsConfig};
pub use validation::{ConfigError, expand_env_vars};

// Re-export constants
pub use app::{
    DEFAULT_ANALYSIS_MINUTES, DEFAULT_CONFIG_PATH, DEFAULT_FREQUENCY_MINUTES,
    DEFAULT_XTICK_INTERVAL, MAX_MINUTES,
};
