//! Instrument Capabilities
//!
//! Fine-grained capability traits for the two collaborators a swept
//! measurement needs. Devices implement only what they support:
//!
//! - A tunable laser implements `WavelengthTunable` and usually
//!   `SourcePowerControl`
//! - A spectrum analyzer implements `SpectrumAnalyzer`
//!
//! Transport details (bus addressing, SCPI dialects) live behind these traits
//! and are not part of the scan engine.
//!
//! # Design Philosophy
//!
//! Each capability trait:
//! - Is async (uses #[async_trait])
//! - Is thread-safe (requires Send + Sync)
//! - Uses anyhow::Result for errors
//! - Takes `&self`; implementations use interior mutability
//!
//! Implementations are not required to bound their own latency. The scan
//! engine wraps every call in a timeout.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One raw analyzer trace.
///
/// `powers` are in dBm, evenly spaced from `frequency_start_hz` to
/// `frequency_stop_hz` inclusive. A transient failure may be reported as an
/// empty `powers` vector instead of an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumTrace {
    /// First bin, in Hz
    pub frequency_start_hz: f64,
    /// Last bin, in Hz
    pub frequency_stop_hz: f64,
    /// Readings in dBm
    pub powers: Vec<f64>,
}

/// Analyzer setup applied once when a session initializes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerSettings {
    /// Span start, in Hz
    pub frequency_start_hz: f64,
    /// Span stop, in Hz
    pub frequency_stop_hz: f64,
    /// RBW in Hz
    pub resolution_bandwidth_hz: f64,
    /// Trace length the analyzer should return
    pub sweep_points: usize,
}

/// Capability: Wavelength Tuning
///
/// Swept sources (tunable lasers). Wavelengths are in nanometres.
///
/// # Contract
/// - `set_wavelength` returns the wavelength the device reports after the move,
///   which may differ slightly from the request
/// - `wavelength` reads the current value without moving
#[async_trait]
pub trait WavelengthTunable: Send + Sync {
    /// Tune to `nm` and return the actual wavelength reached
    async fn set_wavelength(&self, nm: f64) -> Result<f64>;

    /// Read the current wavelength
    async fn wavelength(&self) -> Result<f64>;

    /// Supported range `(min_nm, max_nm)`
    fn wavelength_range(&self) -> (f64, f64) {
        (f64::MIN, f64::MAX)
    }
}

/// Capability: Source Power Control
///
/// Out-of-band controls of the source that the scan loop itself never calls.
#[async_trait]
pub trait SourcePowerControl: Send + Sync {
    /// Set output power in dBm
    async fn set_power(&self, dbm: f64) -> Result<()>;

    /// Read output power in dBm
    async fn power(&self) -> Result<f64>;

    /// Settable power range `(min_dbm, max_dbm)`
    fn power_range(&self) -> (f64, f64);

    /// Enable or disable optical output
    async fn set_output_enabled(&self, enabled: bool) -> Result<()>;

    /// Current output state
    async fn is_output_enabled(&self) -> Result<bool>;

    /// Switch between automatic power control (APC) and constant current
    async fn set_apc_enabled(&self, enabled: bool) -> Result<()>;

    /// `true` while APC is active
    async fn is_apc_enabled(&self) -> Result<bool>;
}

/// Capability: Spectrum Acquisition
///
/// Electrical/optical spectrum analyzers producing one trace per call.
#[async_trait]
pub trait SpectrumAnalyzer: Send + Sync {
    /// Trigger a single sweep and return the trace
    async fn acquire_spectrum(&self) -> Result<SpectrumTrace>;

    /// Duration of one sweep as reported by the instrument, in milliseconds
    async fn sweep_time_ms(&self) -> Result<f64>;

    /// Return the display to a safe auto-scaled state
    async fn auto_scale(&self) -> Result<()>;

    /// Apply frequency range, RBW and sweep point count
    async fn configure(&self, settings: &AnalyzerSettings) -> Result<()>;

    /// Largest trace length the instrument supports
    fn max_sweep_points(&self) -> usize {
        40_001
    }
}
