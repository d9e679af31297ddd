//! Wavelength step sequence.
//!
//! The sequence holds `floor((stop - start) / step) + 1` points starting at
//! `start`. The last point may land short of `stop`; it is never snapped to it.
//! Points are computed as `start + i * step` so round-off does not accumulate.

use crate::error::{AppResult, DaqError};

/// Relative slack applied to the step-count quotient, so that ranges which
/// divide evenly in decimal (1550..1551 by 0.1) keep their final point.
const COUNT_SLACK: f64 = 1e-9;

/// Hard upper bound on the number of steps any stepper will hold.
pub const MAX_STEPS: usize = u32::MAX as usize;

/// Deterministic wavelength sequence for one scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WavelengthStepper {
    start: f64,
    stop: f64,
    step: f64,
    len: usize,
}

impl WavelengthStepper {
    /// Build a stepper bounded by [`MAX_STEPS`].
    pub fn new(start: f64, stop: f64, step: f64) -> AppResult<Self> {
        Self::with_max_len(start, stop, step, MAX_STEPS)
    }

    /// Build a stepper, refusing sequences longer than `max_len` points.
    pub fn with_max_len(start: f64, stop: f64, step: f64, max_len: usize) -> AppResult<Self> {
        if !(start.is_finite() && stop.is_finite() && step.is_finite()) {
            return Err(DaqError::Configuration(format!(
                "Wavelength sweep values must be finite (start={start}, stop={stop}, step={step})"
            )));
        }
        if step <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "Wavelength step must be positive, got {step}"
            )));
        }
        if stop <= start {
            return Err(DaqError::Configuration(format!(
                "Stop wavelength {stop} must be greater than start {start}"
            )));
        }

        let max_len = max_len.min(MAX_STEPS);
        let intervals = ((stop - start) / step * (1.0 + COUNT_SLACK)).floor();
        // checked in f64 first: the cast saturates on huge quotients
        if !(intervals < max_len as f64) {
            return Err(DaqError::Configuration(format!(
                "Wavelength step {step} nm over {start}..{stop} nm exceeds the {max_len} step limit"
            )));
        }
        let len = (intervals as usize).checked_add(1).ok_or_else(|| {
            DaqError::Configuration(format!("Step count overflow for step {step} nm"))
        })?;
        Ok(Self {
            start,
            stop,
            step,
            len,
        })
    }

    /// Number of points in the sequence
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always false for a constructed stepper.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Wavelength of step `index`
    pub fn get(&self, index: usize) -> Option<f64> {
        (index < self.len).then(|| (self.start + index as f64 * self.step).min(self.stop))
    }

    /// Iterate the sequence in order
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len).filter_map(move |i| self.get(i))
    }

    /// Collect the whole sequence
    pub fn sequence(&self) -> Vec<f64> {
        self.iter().collect()
    }
}
