//! Configuration structures for the kernel and its simulation harness.
//!
//! Supports TOML deserialization with defaults that suit host-side
//! simulation; firmware images bake their values in at build time.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level kernel configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Task scheduler configuration.
    pub scheduler: SchedulerConfig,

    /// Clock configuration.
    pub clock: ClockConfig,

    /// Simulated interrupt configuration.
    pub reactor: ReactorConfig,

    /// Simulation logging configuration.
    pub simulation: SimulationConfig,
}

/// Task scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Number of task slots. Fixed for the lifetime of the scheduler.
    pub capacity: usize,

    /// Longest the run loop sleeps when no task names an earlier wake time.
    #[serde(with = "humantime_serde")]
    pub max_idle: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            capacity: 16,
            max_idle: Duration::from_secs(5),
        }
    }
}

/// How a virtual clock moves when nobody sets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClockMode {
    /// Time only moves through `set_current_time` and friends.
    #[default]
    Frozen,
    /// Time follows the host clock multiplied by the scale factor.
    Scaled,
}

/// Clock configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Frozen or scaled virtual time.
    pub mode: ClockMode,

    /// Simulated seconds per host second in scaled mode.
    pub scale: f64,

    /// Upper bound on clamp/react rounds for a single time advance.
    pub max_advance_steps: usize,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            mode: ClockMode::Frozen,
            scale: 1000.0,
            max_advance_steps: 100_000,
        }
    }
}

/// Simulated interrupt configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactorConfig {
    /// Simulated time between polls of the interrupt thread when nothing
    /// signals it.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
        }
    }
}

/// Simulation logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Where to write the call log. A temp file is generated when unset.
    pub log_file: Option<PathBuf>,
}

impl KernelConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or the values are out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check value ranges that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheduler.capacity == 0 {
            return Err(ConfigError::Invalid("scheduler.capacity must be at least 1".into()));
        }
        if !(self.clock.scale.is_finite() && self.clock.scale > 0.0) {
            return Err(ConfigError::Invalid("clock.scale must be a positive number".into()));
        }
        if self.clock.max_advance_steps == 0 {
            return Err(ConfigError::Invalid(
                "clock.max_advance_steps must be at least 1".into(),
            ));
        }
        if self.reactor.poll_interval.is_zero() {
            return Err(ConfigError::Invalid("reactor.poll_interval must be non-zero".into()));
        }
        Ok(())
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Serde helper module for `Duration` using humantime format.
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
