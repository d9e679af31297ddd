//! Configuration system using Figment
//!
//! Settings are layered, lowest priority first:
//! 1. Compiled-in defaults (`Settings::default()`)
//! 2. A TOML file (by default `config/default.toml`)
//! 3. Environment variables prefixed with `SWEEP_DAQ_`, nested with `__`
//!
//! # Example
//! ```no_run
//! use sweep_daq::config::Settings;
//!
//! let settings = Settings::load()?;
//! settings.validate()?;
//! println!("Memory threshold: {} MB", settings.storage.memory_threshold_mb);
//! # Ok::<(), sweep_daq::error::DaqError>(())
//! ```

use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default location of the settings file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationSettings,
    /// Scan loop timing and device timeouts
    pub scan: ScanSettings,
    /// Storage policy
    pub storage: StorageSettings,
    /// Alarm thresholds
    pub alarm: AlarmSettings,
}

/// Application-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSettings {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
    /// Capacity of the scan event broadcast channel
    pub event_channel_capacity: usize,
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            name: "sweep_daq".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            event_channel_capacity: 1024,
        }
    }
}

/// Scan loop timing and device call bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanSettings {
    /// Dwell used when the configured dwell is non-positive
    pub min_dwell_ms: u64,
    /// Interval between "waiting" alarms while paused
    pub pause_heartbeat_ms: u64,
    /// Bound on `set_wavelength` / `wavelength`
    pub source_timeout_ms: u64,
    /// Bound on a single spectrum acquisition
    pub acquire_timeout_ms: u64,
    /// Bound on analyzer housekeeping calls (configure, sweep time, auto-scale)
    pub analyzer_timeout_ms: u64,
    /// Longest wavelength sequence a session may run
    pub max_steps: usize,
    /// Re-read the analyzer sweep time every N steps (0 disables)
    pub sweep_time_refresh_steps: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            min_dwell_ms: 200,
            pause_heartbeat_ms: 1000,
            source_timeout_ms: 10_000,
            acquire_timeout_ms: 60_000,
            analyzer_timeout_ms: 5_000,
            max_steps: 1_000_000,
            sweep_time_refresh_steps: 1,
        }
    }
}

impl ScanSettings {
    /// Dwell floor as a `Duration`
    pub fn min_dwell(&self) -> Duration {
        Duration::from_millis(self.min_dwell_ms)
    }

    /// Interval between paused heartbeats
    pub fn pause_heartbeat(&self) -> Duration {
        Duration::from_millis(self.pause_heartbeat_ms)
    }

    /// Bound on source tuning and readback
    pub fn source_timeout(&self) -> Duration {
        Duration::from_millis(self.source_timeout_ms)
    }

    /// Bound on one acquisition
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    /// Bound on analyzer housekeeping calls
    pub fn analyzer_timeout(&self) -> Duration {
        Duration::from_millis(self.analyzer_timeout_ms)
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Estimated matrix size above which the session streams to disk
    pub memory_threshold_mb: f64,
    /// Directory receiving streamed column stores
    pub stream_dir: PathBuf,
    /// Default directory for exported tables
    pub export_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            memory_threshold_mb: 100.0,
            stream_dir: PathBuf::from("data/stream"),
            export_dir: PathBuf::from("data"),
        }
    }
}

/// Peak power thresholds in dBm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSettings {
    /// Peaks below this raise a low-power alarm
    pub low_power_dbm: f64,
    /// Peaks above this raise a high-power alarm
    pub high_power_dbm: f64,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            low_power_dbm: -50.0,
            high_power_dbm: 10.0,
        }
    }
}

impl Settings {
    /// Load settings from [`DEFAULT_CONFIG_PATH`] and the environment
    ///
    /// A missing file is not an error; defaults apply.
    /// Example override: `SWEEP_DAQ_STORAGE__MEMORY_THRESHOLD_MB=250`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load settings from a specific file path
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let settings: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SWEEP_DAQ_").split("__"))
            .extract()?;
        Ok(settings)
    }

    /// Validate settings after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if self.application.event_channel_capacity == 0 {
            return Err(DaqError::Configuration(
                "event_channel_capacity must be at least 1".to_string(),
            ));
        }

        if !self.storage.memory_threshold_mb.is_finite() || self.storage.memory_threshold_mb <= 0.0
        {
            return Err(DaqError::Configuration(format!(
                "memory_threshold_mb must be positive, got {}",
                self.storage.memory_threshold_mb
            )));
        }

        if self.alarm.low_power_dbm >= self.alarm.high_power_dbm {
            return Err(DaqError::Configuration(format!(
                "low_power_dbm ({}) must be below high_power_dbm ({})",
                self.alarm.low_power_dbm, self.alarm.high_power_dbm
            )));
        }

        if self.scan.max_steps == 0 {
            return Err(DaqError::Configuration(
                "max_steps must be at least 1".to_string(),
            ));
        }

        for (name, value) in [
            ("pause_heartbeat_ms", self.scan.pause_heartbeat_ms),
            ("source_timeout_ms", self.scan.source_timeout_ms),
            ("acquire_timeout_ms", self.scan.acquire_timeout_ms),
            ("analyzer_timeout_ms", self.scan.analyzer_timeout_ms),
        ] {
            if value == 0 {
                return Err(DaqError::Configuration(format!(
                    "{name} must be greater than zero"
                )));
            }
        }

        Ok(())
    }
}
