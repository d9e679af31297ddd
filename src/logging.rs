//! Tracing setup for the `sweep_daq` binary.
//!
//! One `tracing-subscriber` fmt layer (pretty, compact or JSON) filtered by
//! `RUST_LOG`, falling back to the configured `application.log_level`.
//!
//! ```no_run
//! use sweep_daq::{config::Settings, logging};
//!
//! # fn main() -> Result<(), sweep_daq::DaqError> {
//! let settings = Settings::load()?;
//! logging::init_from_settings(&settings, None)?;
//! tracing::info!("Application started");
//! # Ok(())
//! # }
//! ```

use crate::config::Settings;
use crate::error::{AppResult, DaqError};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Log line layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Multi-line with colors, for a terminal
    Pretty,
    /// Single line, no colors
    Compact,
    /// One JSON object per event
    Json,
}

impl FromStr for OutputFormat {
    type Err = DaqError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" => Ok(OutputFormat::Pretty),
            "compact" => Ok(OutputFormat::Compact),
            "json" => Ok(OutputFormat::Json),
            other => Err(DaqError::Configuration(format!(
                "Invalid log format '{other}'. Must be one of: pretty, compact, json"
            ))),
        }
    }
}

/// Install the global subscriber from settings.
///
/// `level_override` (e.g. from `--verbose`) wins over the configured level
/// but not over `RUST_LOG`. Returns `false` when a subscriber was already
/// installed, which leaves the existing one in place.
pub fn init_from_settings(settings: &Settings, level_override: Option<Level>) -> AppResult<bool> {
    let level = match level_override {
        Some(level) => level,
        None => Level::from_str(&settings.application.log_level).map_err(|_| {
            DaqError::Configuration(format!(
                "Invalid log level '{}'",
                settings.application.log_level
            ))
        })?,
    };
    let format = settings.application.log_format.parse()?;
    Ok(init(level, format))
}

/// Install the global subscriber. Returns `false` if one already exists.
pub fn init(level: Level, format: OutputFormat) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let layer = match format {
        OutputFormat::Pretty => fmt::layer().pretty().with_filter(filter).boxed(),
        OutputFormat::Compact => fmt::layer()
            .compact()
            .with_ansi(false)
            .with_filter(filter)
            .boxed(),
        OutputFormat::Json => fmt::layer()
            .json()
            .with_file(true)
            .with_line_number(true)
            .with_filter(filter)
            .boxed(),
    };

    tracing_subscriber::registry().with(layer).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_parse_case_insensitively() {
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!(matches!(
            "xml".parse::<OutputFormat>(),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn bad_level_is_a_configuration_error() {
        let mut settings = Settings::default();
        settings.application.log_level = "verbose".to_string();
        assert!(matches!(
            init_from_settings(&settings, None),
            Err(DaqError::Configuration(_))
        ));
    }

    #[test]
    fn second_init_keeps_the_first_subscriber() {
        init(Level::WARN, OutputFormat::Compact);
        assert!(!init(Level::DEBUG, OutputFormat::Json));
    }
}
