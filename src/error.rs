//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole crate.
//! Using the `thiserror` crate, it gives a single place to classify what can go
//! wrong during a swept acquisition, from bad scan parameters to a storage
//! file that cannot be written.
//!
//! ## Error Hierarchy
//!
//! - **`Configuration`**: Semantic errors in a `ScanConfig` or in `Settings`
//!   (e.g. `stop <= start`), or a `start()` issued while a session is active.
//!   Fatal to the call that produced it; the session never begins.
//! - **`Config`**: Wraps errors from `figment` while loading settings files.
//! - **`DeviceNotConnected`**: A required collaborator (source or analyzer) was
//!   not attached when the session started.
//! - **`DeviceComm`**: A single device call timed out or failed. Inside the scan
//!   loop this is recovered: the step is skipped with an alarm.
//! - **`DataConsistency`**: A frame whose length disagrees with the established
//!   frequency-point count. Recovered: the column is dropped.
//! - **`Resource`**: The streamed store could not be opened or written. Aborts
//!   the session.
//! - **`InvalidState`**: A command (pause, resume, wait) that does not apply to
//!   the current scan state.
//! - **`Io`**, **`Csv`**, **`Arrow`**, **`Serialization`**: Wrapped
//!   lower-level failures from export, the column store and its manifest.
//!
//! `is_recoverable()` tells the orchestrator which of these are absorbed into
//! alarm events and which end the session.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every failure the crate reports.
#[derive(Error, Debug)]
pub enum DaqError {
    /// Invalid scan parameters or settings, or a session already active
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Source or analyzer missing at start
    #[error("Device not connected: {0}")]
    DeviceNotConnected(String),

    /// A device call failed or timed out
    #[error("Device communication error: {0}")]
    DeviceComm(String),

    /// Frame length differs from the session's frequency-point count
    #[error("Frame length {actual} does not match established frequency points {expected}")]
    DataConsistency {
        /// Established frequency points
        expected: usize,
        /// Length of the offending frame
        actual: usize,
    },

    /// Streamed store could not be opened, written or read
    #[error("Storage resource error: {0}")]
    Resource(String),

    /// `choose_storage_mode` called twice
    #[error("Storage mode already chosen for this session")]
    StorageModeAlreadyChosen,

    /// Command does not apply to the current scan state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Worker task panicked or was cancelled
    #[error("Scan worker terminated abnormally: {0}")]
    WorkerJoin(#[from] tokio::task::JoinError),

    /// Table export failed
    #[error("Export error: {0}")]
    Export(String),

    /// Underlying I/O failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV writer failure
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Arrow IPC encode/decode failure
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DaqError {
    /// Whether the scan loop may absorb this error and keep going.
    ///
    /// Per-step failures surface only as alarm events; everything else stops
    /// the session outright.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DaqError::DeviceComm(_) | DaqError::DataConsistency { .. }
        )
    }
}

impl From<figment::Error> for DaqError {
    fn from(value: figment::Error) -> Self {
        DaqError::Config(Box::new(value))
    }
}
