//! Events broadcast to scan listeners.
//!
//! Payload arrays are shared `Arc<[f64]>` snapshots; listeners never see data
//! the worker may still mutate.

use crate::scan::alarm::Severity;
use crate::scan::session::{ScanState, ScanSummary};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Notification published on the orchestrator's broadcast channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScanEvent {
    /// Lifecycle transition
    StateChanged {
        /// New state
        state: ScanState,
    },
    /// Sent after every attempted step
    Progress {
        /// Floor of completed over total, 0 to 100
        percent: u8,
        /// Wavelength of the step just attempted
        wavelength_nm: f64,
        /// Steps attempted so far
        completed_steps: usize,
        /// Steps in the grid
        total_steps: usize,
        /// Projected completion time
        eta: DateTime<Utc>,
    },
    /// One acquired spectrum
    Frame {
        /// Zero-based step the frame belongs to
        step_index: usize,
        /// Reported wavelength of the step
        wavelength_nm: f64,
        /// Frequency axis, in Hz
        frequencies: Arc<[f64]>,
        /// Readings in dBm
        powers: Arc<[f64]>,
    },
    /// Something the operator should know about
    Alarm {
        /// Human-readable description
        message: String,
        /// How serious it is
        severity: Severity,
    },
    /// Dataset estimate exceeded the in-memory budget
    MemoryWarning {
        /// Projected dataset size
        estimated_mb: f64,
        /// Configured budget
        threshold_mb: f64,
    },
    /// Finalizing finished, with or without interruption
    SessionComplete {
        /// What was stored
        summary: ScanSummary,
    },
    /// Unrecoverable error; no further steps run
    SessionFailed {
        /// Error that ended the session
        reason: String,
    },
}

impl ScanEvent {
    /// Shorthand for [`ScanEvent::Alarm`]
    pub fn alarm(severity: Severity, message: impl Into<String>) -> Self {
        ScanEvent::Alarm {
            message: message.into(),
            severity,
        }
    }

    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ScanEvent::StateChanged { .. } => "state_changed",
            ScanEvent::Progress { .. } => "progress",
            ScanEvent::Frame { .. } => "frame",
            ScanEvent::Alarm { .. } => "alarm",
            ScanEvent::MemoryWarning { .. } => "memory_warning",
            ScanEvent::SessionComplete { .. } => "session_complete",
            ScanEvent::SessionFailed { .. } => "session_failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_type_tag() {
        let event = ScanEvent::alarm(Severity::Warning, "Low power");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "alarm");
        assert_eq!(json["severity"], "warning");
        assert_eq!(event.kind(), "alarm");
    }

    #[test]
    fn frame_payload_serializes_as_arrays() {
        let event = ScanEvent::Frame {
            step_index: 0,
            wavelength_nm: 1550.0,
            frequencies: vec![1.0, 2.0].into(),
            powers: vec![-10.0, -20.0].into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["powers"][1], -20.0);
    }
}
