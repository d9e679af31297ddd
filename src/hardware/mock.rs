//! Mock Hardware Implementations
//!
//! Simulated instruments for testing and demos without a bench.
//! All mock devices use async-safe operations (tokio::time::sleep, not std::thread::sleep).
//!
//! # Available Mocks
//!
//! - `MockTunableLaser` - 1500-1600 nm swept source with power/output/APC state
//! - `MockSpectrumAnalyzer` - Analyzer producing a synthetic peak, with a
//!   per-call script for injecting failures, empty traces and odd lengths

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, Duration};

use crate::hardware::capabilities::{
    AnalyzerSettings, SourcePowerControl, SpectrumAnalyzer, SpectrumTrace, WavelengthTunable,
};

// =============================================================================
// MockTunableLaser - Simulated Swept Source
// =============================================================================

#[derive(Debug, Clone, Copy)]
struct SourceState {
    wavelength_nm: f64,
    power_dbm: f64,
    output_enabled: bool,
    apc_enabled: bool,
}

/// Mock tunable laser
///
/// Simulates a swept source with:
/// - 1500-1600 nm tuning range
/// - -20..13 dBm power range
/// - Optional tuning delay
/// - Optional failure of every `set_wavelength` call
///
/// # Example
///
/// ```rust,ignore
/// let laser = MockTunableLaser::new();
/// let actual = laser.set_wavelength(1550.0).await?;
/// assert_eq!(actual, 1550.0);
/// ```
pub struct MockTunableLaser {
    state: Arc<RwLock<SourceState>>,
    tune_delay: Duration,
    fail_tuning: bool,
    fail_readback: bool,
    settle_offset_nm: f64,
    tune_count: AtomicUsize,
    power_commands: AtomicUsize,
}

impl MockTunableLaser {
    /// Lower tuning limit
    pub const MIN_WAVELENGTH_NM: f64 = 1500.0;
    /// Upper tuning limit
    pub const MAX_WAVELENGTH_NM: f64 = 1600.0;

    /// Create new mock laser parked at 1500 nm
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(SourceState {
                wavelength_nm: Self::MIN_WAVELENGTH_NM,
                power_dbm: 0.0,
                output_enabled: false,
                apc_enabled: false,
            })),
            tune_delay: Duration::ZERO,
            fail_tuning: false,
            fail_readback: false,
            settle_offset_nm: 0.0,
            tune_count: AtomicUsize::new(0),
            power_commands: AtomicUsize::new(0),
        }
    }

    /// Delay applied to each wavelength move
    pub fn with_tune_delay(mut self, delay: Duration) -> Self {
        self.tune_delay = delay;
        self
    }

    /// Make every `set_wavelength` call fail
    pub fn with_failing_tuning(mut self) -> Self {
        self.fail_tuning = true;
        self
    }

    /// Make every `wavelength` readback fail
    pub fn with_failing_readback(mut self) -> Self {
        self.fail_readback = true;
        self
    }

    /// Settle this far from each requested wavelength
    pub fn with_settle_offset_nm(mut self, offset_nm: f64) -> Self {
        self.settle_offset_nm = offset_nm;
        self
    }

    /// Number of `set_wavelength` calls received
    pub fn tune_count(&self) -> usize {
        self.tune_count.load(Ordering::SeqCst)
    }

    /// Number of power commands received
    pub fn power_commands(&self) -> usize {
        self.power_commands.load(Ordering::SeqCst)
    }
}

impl Default for MockTunableLaser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WavelengthTunable for MockTunableLaser {
    async fn set_wavelength(&self, nm: f64) -> Result<f64> {
        self.tune_count.fetch_add(1, Ordering::SeqCst);
        if self.fail_tuning {
            bail!("MockTunableLaser: tuning fault injected");
        }
        if !(Self::MIN_WAVELENGTH_NM..=Self::MAX_WAVELENGTH_NM).contains(&nm) {
            bail!(
                "Wavelength {nm} nm out of range ({}-{} nm)",
                Self::MIN_WAVELENGTH_NM,
                Self::MAX_WAVELENGTH_NM
            );
        }

        if !self.tune_delay.is_zero() {
            sleep(self.tune_delay).await;
        }

        let settled = nm + self.settle_offset_nm;
        self.state.write().await.wavelength_nm = settled;
        Ok(settled)
    }

    async fn wavelength(&self) -> Result<f64> {
        if self.fail_readback {
            bail!("MockTunableLaser: readback fault injected");
        }
        Ok(self.state.read().await.wavelength_nm)
    }

    fn wavelength_range(&self) -> (f64, f64) {
        (Self::MIN_WAVELENGTH_NM, Self::MAX_WAVELENGTH_NM)
    }
}

#[async_trait]
impl SourcePowerControl for MockTunableLaser {
    async fn set_power(&self, dbm: f64) -> Result<()> {
        let (min, max) = self.power_range();
        if !(min..=max).contains(&dbm) {
            bail!("Power {dbm} dBm out of range ({min}-{max} dBm)");
        }
        self.power_commands.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.write().await;
        state.power_dbm = dbm;
        if dbm.abs() > 1e-3 {
            state.output_enabled = true;
        }
        Ok(())
    }

    async fn power(&self) -> Result<f64> {
        Ok(self.state.read().await.power_dbm)
    }

    fn power_range(&self) -> (f64, f64) {
        (-20.0, 13.0)
    }

    async fn set_output_enabled(&self, enabled: bool) -> Result<()> {
        self.state.write().await.output_enabled = enabled;
        Ok(())
    }

    async fn is_output_enabled(&self) -> Result<bool> {
        Ok(self.state.read().await.output_enabled)
    }

    async fn set_apc_enabled(&self, enabled: bool) -> Result<()> {
        self.state.write().await.apc_enabled = enabled;
        Ok(())
    }

    async fn is_apc_enabled(&self) -> Result<bool> {
        Ok(self.state.read().await.apc_enabled)
    }
}

// =============================================================================
// MockSpectrumAnalyzer - Simulated Analyzer
// =============================================================================

/// Scripted behavior of a single `acquire_spectrum` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AcquireBehavior {
    /// Trace of the configured length with the configured peak
    Normal,
    /// Return an error
    Fail,
    /// Return a trace with no points
    Empty,
    /// Return a trace of this many points
    Length(usize),
    /// Return a normal-length trace whose peak is this value in dBm
    Peak(f64),
    /// Sleep for this long before returning a normal trace
    Delay(Duration),
}

/// Mock spectrum analyzer
///
/// Produces a Lorentzian-like peak on a -80 dBm floor. Calls follow a script
/// of [`AcquireBehavior`]s; once the script is exhausted every call is
/// `Normal`.
pub struct MockSpectrumAnalyzer {
    settings: RwLock<AnalyzerSettings>,
    script: Mutex<VecDeque<AcquireBehavior>>,
    acquire_delay: Duration,
    sweep_time_ms: f64,
    sweep_time_readings: Mutex<VecDeque<f64>>,
    peak_dbm: f64,
    max_points: usize,
    acquisitions: AtomicUsize,
    auto_scale_calls: AtomicUsize,
}

impl MockSpectrumAnalyzer {
    /// Create new mock analyzer producing `points`-long traces over 1-2 GHz
    pub fn new(points: usize) -> Self {
        Self {
            settings: RwLock::new(AnalyzerSettings {
                frequency_start_hz: 1e9,
                frequency_stop_hz: 2e9,
                resolution_bandwidth_hz: 1e6,
                sweep_points: points,
            }),
            script: Mutex::new(VecDeque::new()),
            acquire_delay: Duration::ZERO,
            sweep_time_ms: 50.0,
            sweep_time_readings: Mutex::new(VecDeque::new()),
            peak_dbm: -20.0,
            max_points: 40_001,
            acquisitions: AtomicUsize::new(0),
            auto_scale_calls: AtomicUsize::new(0),
        }
    }

    /// Queue per-call behaviors, consumed in order
    pub fn with_script(self, script: impl IntoIterator<Item = AcquireBehavior>) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..self
        }
    }

    /// Delay applied to every acquisition
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Fixed sweep time reported by `sweep_time_ms`
    pub fn with_sweep_time_ms(mut self, ms: f64) -> Self {
        self.sweep_time_ms = ms;
        self
    }

    /// Successive `sweep_time_ms` readings; the last one repeats
    pub fn with_sweep_time_readings(self, readings: impl IntoIterator<Item = f64>) -> Self {
        Self {
            sweep_time_readings: Mutex::new(readings.into_iter().collect()),
            ..self
        }
    }

    /// Peak level of `Normal` traces
    pub fn with_peak_dbm(mut self, dbm: f64) -> Self {
        self.peak_dbm = dbm;
        self
    }

    /// Largest point count `configure` accepts
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.max_points = max_points;
        self
    }

    /// Number of `acquire_spectrum` calls received
    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    /// Number of `auto_scale` calls received
    pub fn auto_scale_calls(&self) -> usize {
        self.auto_scale_calls.load(Ordering::SeqCst)
    }

    /// Settings most recently applied through `configure`
    pub async fn current_settings(&self) -> AnalyzerSettings {
        *self.settings.read().await
    }

    fn synthesize(&self, settings: &AnalyzerSettings, points: usize, peak_dbm: f64) -> SpectrumTrace {
        let floor = -80.0;
        let center = (points / 2) as f64;
        let width = (points as f64 / 50.0).max(1.0);
        let powers = (0..points)
            .map(|i| {
                let x = (i as f64 - center) / width;
                floor + (peak_dbm - floor) / (1.0 + x * x)
            })
            .collect();

        SpectrumTrace {
            frequency_start_hz: settings.frequency_start_hz,
            frequency_stop_hz: settings.frequency_stop_hz,
            powers,
        }
    }
}

#[async_trait]
impl SpectrumAnalyzer for MockSpectrumAnalyzer {
    async fn acquire_spectrum(&self) -> Result<SpectrumTrace> {
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let behavior = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or(AcquireBehavior::Normal);

        if !self.acquire_delay.is_zero() {
            sleep(self.acquire_delay).await;
        }

        let settings = *self.settings.read().await;
        match behavior {
            AcquireBehavior::Normal => {
                Ok(self.synthesize(&settings, settings.sweep_points, self.peak_dbm))
            }
            AcquireBehavior::Fail => Err(anyhow!("MockSpectrumAnalyzer: acquisition fault injected")),
            AcquireBehavior::Empty => Ok(SpectrumTrace {
                frequency_start_hz: settings.frequency_start_hz,
                frequency_stop_hz: settings.frequency_stop_hz,
                powers: Vec::new(),
            }),
            AcquireBehavior::Length(points) => Ok(self.synthesize(&settings, points, self.peak_dbm)),
            AcquireBehavior::Peak(peak) => {
                Ok(self.synthesize(&settings, settings.sweep_points, peak))
            }
            AcquireBehavior::Delay(delay) => {
                sleep(delay).await;
                Ok(self.synthesize(&settings, settings.sweep_points, self.peak_dbm))
            }
        }
    }

    async fn sweep_time_ms(&self) -> Result<f64> {
        let mut readings = self.sweep_time_readings.lock().await;
        let reading = if readings.len() > 1 {
            readings.pop_front()
        } else {
            readings.front().copied()
        };
        Ok(reading.unwrap_or(self.sweep_time_ms))
    }

    async fn auto_scale(&self) -> Result<()> {
        self.auto_scale_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn configure(&self, settings: &AnalyzerSettings) -> Result<()> {
        if settings.sweep_points == 0 || settings.sweep_points > self.max_points {
            bail!(
                "Sweep points must be within 1-{}, got {}",
                self.max_points,
                settings.sweep_points
            );
        }
        if settings.frequency_stop_hz <= settings.frequency_start_hz {
            bail!("Stop frequency must exceed start frequency");
        }
        *self.settings.write().await = *settings;
        Ok(())
    }

    fn max_sweep_points(&self) -> usize {
        self.max_points
    }
}
