//! A single acquired spectrum.

use crate::hardware::SpectrumTrace;
use std::sync::Arc;

/// Evenly spaced frequency axis. A single point sits at `start`.
pub fn frequency_axis(start_hz: f64, stop_hz: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start_hz],
        n => {
            let spacing = (stop_hz - start_hz) / (n - 1) as f64;
            (0..n).map(|i| start_hz + i as f64 * spacing).collect()
        }
    }
}

/// Power readings of one step. The frequency axis is implied by
/// `(frequency_start_hz, frequency_stop_hz, len)`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumFrame {
    /// First bin, in Hz
    pub frequency_start_hz: f64,
    /// Last bin, in Hz
    pub frequency_stop_hz: f64,
    /// Readings in dBm, shared with `Frame` events
    pub powers: Arc<[f64]>,
}

impl SpectrumFrame {
    /// Number of frequency bins
    pub fn len(&self) -> usize {
        self.powers.len()
    }

    /// No readings
    pub fn is_empty(&self) -> bool {
        self.powers.is_empty()
    }

    /// Materialized frequency axis, in Hz
    pub fn frequencies(&self) -> Vec<f64> {
        frequency_axis(self.frequency_start_hz, self.frequency_stop_hz, self.len())
    }

    /// Highest reading in dBm, ignoring NaN
    pub fn peak(&self) -> Option<f64> {
        self.powers
            .iter()
            .copied()
            .filter(|p| !p.is_nan())
            .reduce(f64::max)
    }
}

impl From<SpectrumTrace> for SpectrumFrame {
    fn from(trace: SpectrumTrace) -> Self {
        Self {
            frequency_start_hz: trace.frequency_start_hz,
            frequency_stop_hz: trace.frequency_stop_hz,
            powers: trace.powers.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axis_spans_both_ends() {
        let axis = frequency_axis(1e9, 2e9, 5);
        assert_eq!(axis, vec![1e9, 1.25e9, 1.5e9, 1.75e9, 2e9]);
    }

    #[test]
    fn single_point_axis_is_start() {
        assert_eq!(frequency_axis(1e9, 2e9, 1), vec![1e9]);
        assert!(frequency_axis(1e9, 2e9, 0).is_empty());
    }

    #[test]
    fn peak_skips_nan() {
        let frame = SpectrumFrame {
            frequency_start_hz: 0.0,
            frequency_stop_hz: 1.0,
            powers: vec![-60.0, f64::NAN, -12.5, -70.0].into(),
        };
        assert_eq!(frame.peak(), Some(-12.5));
        assert_eq!(frame.frequencies().len(), 4);
    }
}
