//! Scan lifecycle state and per-session bookkeeping.
//!
//! # State Machine
//!
//! ```text
//! Idle ──start()──▶ Initializing ──▶ Stepping ──▶ Finalizing ──▶ Stopped
//!                        │             │  ▲            │
//!                        │      pause()│  │resume()    └──────▶ Failed
//!                        │             ▼  │
//!                        │            Paused
//!                        └──(device missing / store error)──▶ Failed
//! ```

use crate::data::StorageMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Lifecycle of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    /// No session has run yet
    Idle,
    /// Analyzer setup and storage decision
    Initializing,
    /// Worker is running the step loop
    Stepping,
    /// Worker is parked at the top of an iteration
    Paused,
    /// Auto-scale, storage close and reconciliation
    Finalizing,
    /// Session ended after completion or stop
    Stopped,
    /// Session ended on an unrecoverable error
    Failed,
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScanState::Idle => write!(f, "idle"),
            ScanState::Initializing => write!(f, "initializing"),
            ScanState::Stepping => write!(f, "stepping"),
            ScanState::Paused => write!(f, "paused"),
            ScanState::Finalizing => write!(f, "finalizing"),
            ScanState::Stopped => write!(f, "stopped"),
            ScanState::Failed => write!(f, "failed"),
        }
    }
}

impl ScanState {
    /// Check if a new session may start from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, ScanState::Idle | ScanState::Stopped | ScanState::Failed)
    }

    /// The last session ended; nothing is running.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Stopped | ScanState::Failed)
    }

    /// A session exists and has not reached a terminal state.
    pub fn is_active(&self) -> bool {
        !self.can_start()
    }
}

/// Mutable record of one session, owned by the worker.
#[derive(Debug, Clone)]
pub struct ScanSession {
    /// Unique per session
    pub id: Uuid,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Steps in the grid
    pub total_steps: usize,
    /// Index of the step in progress
    pub current_step: usize,
    /// Steps attempted, including skipped ones
    pub completed_steps: usize,
    /// Steps that contributed a column
    pub successful_steps: usize,
    /// Current estimate used for the ETA
    pub step_duration: Duration,
}

impl ScanSession {
    /// Fresh session with a new id, started now
    pub fn new(total_steps: usize, step_duration: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            total_steps,
            current_step: 0,
            completed_steps: 0,
            successful_steps: 0,
            step_duration,
        }
    }
}

/// End-of-session summary carried by `SessionComplete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Id of the session this summarizes
    pub session_id: Uuid,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end of finalizing
    pub finished_at: DateTime<Utc>,
    /// Steps planned by the stepper
    pub total_steps: usize,
    /// Steps attempted, including skipped ones
    pub completed_steps: usize,
    /// Steps that contributed a column
    pub successful_steps: usize,
    /// Columns actually held by the dataset
    pub columns: usize,
    /// Rows per column, 0 when nothing was stored
    pub frequency_points: usize,
    /// Where the dataset was kept
    pub storage_mode: StorageMode,
    /// Session ended before the last step (stop or failure)
    pub interrupted: bool,
}
