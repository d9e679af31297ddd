//! Scan parameters.

use crate::error::{AppResult, DaqError};
use crate::hardware::{recommended_sweep_points, AnalyzerSettings, SweepPointRecommendation};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parameters of one swept acquisition. Validated once when a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// First wavelength, in nm
    pub wavelength_start_nm: f64,
    /// Last wavelength, in nm (inclusive)
    pub wavelength_stop_nm: f64,
    /// Positive increment between steps
    pub wavelength_step_nm: f64,
    /// Hold time at each wavelength, in seconds
    pub dwell_s: f64,
    /// Analyzer span start, in Hz
    pub frequency_start_hz: f64,
    /// Analyzer span stop, in Hz
    pub frequency_stop_hz: f64,
    /// Analyzer RBW, in Hz
    pub resolution_bandwidth_hz: f64,
    /// Manual analyzer point count; derived from span and RBW when `None`
    #[serde(default)]
    pub sweep_points: Option<usize>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            wavelength_start_nm: 1550.0,
            wavelength_stop_nm: 1551.0,
            wavelength_step_nm: 0.1,
            dwell_s: 0.1,
            frequency_start_hz: 1e9,
            frequency_stop_hz: 2e9,
            resolution_bandwidth_hz: 1e6,
            sweep_points: None,
        }
    }
}

impl ScanConfig {
    /// Reject non-finite values, empty ranges and non-positive steps.
    pub fn validate(&self) -> AppResult<()> {
        let fields = [
            ("wavelength_start_nm", self.wavelength_start_nm),
            ("wavelength_stop_nm", self.wavelength_stop_nm),
            ("wavelength_step_nm", self.wavelength_step_nm),
            ("dwell_s", self.dwell_s),
            ("frequency_start_hz", self.frequency_start_hz),
            ("frequency_stop_hz", self.frequency_stop_hz),
            ("resolution_bandwidth_hz", self.resolution_bandwidth_hz),
        ];
        if let Some((name, value)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(DaqError::Configuration(format!("{name} must be finite, got {value}")));
        }

        if self.wavelength_stop_nm <= self.wavelength_start_nm {
            return Err(DaqError::Configuration(format!(
                "Stop wavelength ({} nm) must be greater than start wavelength ({} nm)",
                self.wavelength_stop_nm, self.wavelength_start_nm
            )));
        }
        if self.wavelength_step_nm <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Wavelength step must be positive, got {} nm",
                self.wavelength_step_nm
            )));
        }
        if self.dwell_s <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Dwell time must be positive, got {} s",
                self.dwell_s
            )));
        }
        if self.frequency_stop_hz <= self.frequency_start_hz {
            return Err(DaqError::Configuration(format!(
                "Stop frequency ({} Hz) must be greater than start frequency ({} Hz)",
                self.frequency_stop_hz, self.frequency_start_hz
            )));
        }
        if self.resolution_bandwidth_hz <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Resolution bandwidth must be positive, got {} Hz",
                self.resolution_bandwidth_hz
            )));
        }
        if self.sweep_points == Some(0) {
            return Err(DaqError::Configuration(
                "Manual sweep point count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Check the wavelength range against what the source can reach.
    pub fn validate_wavelength_range(&self, (min_nm, max_nm): (f64, f64)) -> AppResult<()> {
        if self.wavelength_start_nm < min_nm || self.wavelength_stop_nm > max_nm {
            return Err(DaqError::Configuration(format!(
                "Wavelength range {}-{} nm outside source range {min_nm}-{max_nm} nm",
                self.wavelength_start_nm, self.wavelength_stop_nm
            )));
        }
        Ok(())
    }

    /// Analyzer point count: the manual value capped at `max_points`, or the
    /// RBW-derived recommendation.
    pub fn plan_sweep_points(&self, max_points: usize) -> SweepPointRecommendation {
        match self.sweep_points {
            Some(points) if points > max_points => SweepPointRecommendation {
                points: max_points,
                message: format!(
                    "Manual point count {points} capped to instrument maximum of {max_points}"
                ),
                capped: true,
            },
            Some(points) => SweepPointRecommendation {
                points,
                message: format!("Sweep points set manually to {points}"),
                capped: false,
            },
            None => recommended_sweep_points(
                self.frequency_start_hz,
                self.frequency_stop_hz,
                self.resolution_bandwidth_hz,
                max_points,
            ),
        }
    }

    /// Analyzer setup for this span with the resolved point count
    pub fn analyzer_settings(&self, sweep_points: usize) -> AnalyzerSettings {
        AnalyzerSettings {
            frequency_start_hz: self.frequency_start_hz,
            frequency_stop_hz: self.frequency_stop_hz,
            resolution_bandwidth_hz: self.resolution_bandwidth_hz,
            sweep_points,
        }
    }

    /// Dwell as a `Duration`, or `floor` when it rounds to nothing.
    pub fn dwell_or(&self, floor: Duration) -> Duration {
        Duration::try_from_secs_f64(self.dwell_s)
            .ok()
            .filter(|d| !d.is_zero())
            .unwrap_or(floor)
    }
}
