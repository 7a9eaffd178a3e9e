//! Layered configuration using Figment
//!
//! Configuration is loaded from:
//! 1. a TOML file (`config/iv_daq.toml` by default)
//! 2. environment variables prefixed with `IV_DAQ_`, nested keys separated by `__`
//!
//! The loaded [`AppConfig`] is never mutated afterwards. Command-line overrides
//! are applied by building a new [`RunPlan`](crate::experiment::RunPlan) from it.
//!
//! # Example
//! ```no_run
//! use iv_daq::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Sweeping {} components", config.run.components.len());
//! # Ok::<(), iv_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use crate::sweep::SweepConfig;
use crate::tracing_setup::OutputFormat;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/iv_daq.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    #[serde(default)]
    pub application: ApplicationConfig,
    /// Link to the instrument
    #[serde(default)]
    pub instrument: InstrumentConfig,
    /// Voltage sweep shared by every repeat
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Components, repeat count and output location
    #[serde(default)]
    pub run: RunConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format (pretty, compact, json)
    pub log_format: OutputFormat,
    /// Colored log output
    pub log_ansi: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "iv-daq".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
            log_ansi: true,
        }
    }
}

/// Serial link settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Serial port path (e.g., "/dev/ttyACM0", "COM3")
    pub port: String,
    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Boot-banner lines drained before the first command
    #[serde(default = "default_banner_lines")]
    pub banner_lines: usize,
    /// Upper bound on a single response wait. Unset blocks until the instrument answers.
    #[serde(default, with = "humantime_serde")]
    pub read_timeout: Option<Duration>,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyACM0".to_string(),
            baud_rate: default_baud_rate(),
            banner_lines: default_banner_lines(),
            read_timeout: None,
        }
    }
}

/// Repeat orchestration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Root directory; each component gets a sub-directory
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Sweeps per component
    #[serde(default = "default_repeats")]
    pub repeats: usize,
    /// Components measured in order, with an operator swap before each
    #[serde(default = "default_components")]
    pub components: Vec<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            repeats: default_repeats(),
            components: default_components(),
        }
    }
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_banner_lines() -> usize {
    3
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_repeats() -> usize {
    10
}

fn default_components() -> Vec<String> {
    vec!["test_0".to_string(), "test_1".to_string()]
}

impl AppConfig {
    /// Load configuration from the default file and environment variables
    ///
    /// Environment variables override the file with prefix `IV_DAQ_`.
    /// Example: `IV_DAQ_RUN__REPEATS=3`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("IV_DAQ_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        self.sweep.validate()?;

        if self.run.repeats == 0 {
            return Err(DaqError::Configuration(
                "repeats must be at least 1".to_string(),
            ));
        }

        validate_components(&self.run.components)
    }
}

/// Check that component names are usable as directory names and unique.
pub fn validate_components(components: &[String]) -> AppResult<()> {
    if components.is_empty() {
        return Err(DaqError::Configuration(
            "component list is empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for name in components {
        if name.trim().is_empty() || name == "." || name == ".." {
            return Err(DaqError::Configuration(format!(
                "Invalid component name '{}'",
                name
            )));
        }
        if name.contains(['/', '\\']) {
            return Err(DaqError::Configuration(format!(
                "Component name '{}' must not contain path separators",
                name
            )));
        }
        if name.chars().any(char::is_control) {
            return Err(DaqError::Configuration(format!(
                "Component name {:?} must not contain control characters",
                name
            )));
        }
        if !seen.insert(name.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Duplicate component: {}",
                name
            )));
        }
    }
    Ok(())
}
