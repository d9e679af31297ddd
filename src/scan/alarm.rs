//! Peak power classification.

use crate::config::AlarmSettings;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a step's peak power falls relative to the alarm window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmLevel {
    /// Peak inside the window
    Normal,
    /// Peak below `low_power_dbm`
    LowPower,
    /// Peak above `high_power_dbm`
    HighPower,
}

/// Severity attached to alarm events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, no action needed
    Info,
    /// Step skipped or degraded
    Warning,
    /// Measurement likely unusable
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

impl AlarmLevel {
    /// Severity reported with the alarm event
    pub fn severity(&self) -> Severity {
        match self {
            AlarmLevel::Normal => Severity::Info,
            AlarmLevel::LowPower => Severity::Warning,
            AlarmLevel::HighPower => Severity::Critical,
        }
    }
}

/// Classifies the peak of each frame against fixed thresholds. Observational
/// only; never changes the course of a scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlarmMonitor {
    low_power_dbm: f64,
    high_power_dbm: f64,
}

impl Default for AlarmMonitor {
    fn default() -> Self {
        Self::from_settings(&AlarmSettings::default())
    }
}

impl AlarmMonitor {
    /// Monitor for the window `low_power_dbm..=high_power_dbm`
    pub fn new(low_power_dbm: f64, high_power_dbm: f64) -> Self {
        Self {
            low_power_dbm,
            high_power_dbm,
        }
    }

    /// Thresholds from the `[alarm]` settings section
    pub fn from_settings(settings: &AlarmSettings) -> Self {
        Self::new(settings.low_power_dbm, settings.high_power_dbm)
    }

    /// Classify one peak reading. Both window edges count as normal.
    pub fn classify(&self, peak_dbm: f64) -> AlarmLevel {
        if peak_dbm < self.low_power_dbm {
            AlarmLevel::LowPower
        } else if peak_dbm > self.high_power_dbm {
            AlarmLevel::HighPower
        } else {
            AlarmLevel::Normal
        }
    }

    /// Alarm text for a non-normal level
    pub fn describe(&self, level: AlarmLevel, peak_dbm: f64, wavelength_nm: f64) -> Option<String> {
        match level {
            AlarmLevel::Normal => None,
            AlarmLevel::LowPower => Some(format!(
                "Low power at {wavelength_nm:.3} nm: peak {peak_dbm:.2} dBm below {} dBm",
                self.low_power_dbm
            )),
            AlarmLevel::HighPower => Some(format!(
                "High power at {wavelength_nm:.3} nm: peak {peak_dbm:.2} dBm above {} dBm",
                self.high_power_dbm
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds() {
        let monitor = AlarmMonitor::default();
        assert_eq!(monitor.classify(-50.1), AlarmLevel::LowPower);
        assert_eq!(monitor.classify(-50.0), AlarmLevel::Normal);
        assert_eq!(monitor.classify(-20.0), AlarmLevel::Normal);
        assert_eq!(monitor.classify(10.0), AlarmLevel::Normal);
        assert_eq!(monitor.classify(10.1), AlarmLevel::HighPower);
    }

    #[test]
    fn custom_thresholds() {
        let monitor = AlarmMonitor::new(-30.0, 0.0);
        assert_eq!(monitor.classify(-35.0), AlarmLevel::LowPower);
        assert_eq!(monitor.classify(1.0), AlarmLevel::HighPower);
    }

    #[test]
    fn descriptions_only_for_alarms() {
        let monitor = AlarmMonitor::default();
        assert!(monitor.describe(AlarmLevel::Normal, -20.0, 1550.0).is_none());
        let text = monitor
            .describe(AlarmLevel::HighPower, 12.0, 1550.0)
            .unwrap();
        assert!(text.contains("1550.000"));
        assert_eq!(AlarmLevel::HighPower.severity(), Severity::Critical);
    }
}
