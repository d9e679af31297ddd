//! Assembly of per-step spectra into a frequency × wavelength dataset.
//!
//! The aggregator decides once per session whether the dataset fits in memory
//! or must be streamed to disk, then accepts one column per successful
//! wavelength step. The first column fixes the number of frequency points;
//! columns of any other length are rejected and leave the dataset untouched.

use crate::config::StorageSettings;
use crate::data::column_store::{StorageHandle, StreamedStore};
use crate::data::matrix::DataMatrix;
use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Where the session's dataset lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Columns held in a [`DataMatrix`](crate::data::DataMatrix)
    InMemory,
    /// Columns appended to a file as they arrive
    Streamed,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::InMemory => write!(f, "in-memory"),
            StorageMode::Streamed => write!(f, "streamed"),
        }
    }
}

/// Outcome of [`DataAggregator::choose_storage_mode`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StorageDecision {
    /// Mode the session will use
    pub mode: StorageMode,
    /// Projected size of the full dataset
    pub estimated_mb: f64,
    /// Budget the estimate was compared against
    pub threshold_mb: f64,
}

impl StorageDecision {
    /// The estimate exceeded the in-memory budget.
    pub fn exceeds_budget(&self) -> bool {
        self.mode == StorageMode::Streamed
    }
}

/// Finished dataset.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateResult {
    /// Dataset held in memory
    Matrix(DataMatrix),
    /// Dataset on disk, reloadable through the handle
    Streamed(StorageHandle),
}

impl AggregateResult {
    /// `(frequency_points, wavelength_points)`
    pub fn shape(&self) -> (usize, usize) {
        match self {
            AggregateResult::Matrix(m) => m.shape(),
            AggregateResult::Streamed(h) => h.shape(),
        }
    }

    /// Mode the dataset was stored in
    pub fn mode(&self) -> StorageMode {
        match self {
            AggregateResult::Matrix(_) => StorageMode::InMemory,
            AggregateResult::Streamed(_) => StorageMode::Streamed,
        }
    }

    /// Materialize the dataset, reading it back from disk if it was streamed.
    pub fn into_matrix(self) -> AppResult<DataMatrix> {
        match self {
            AggregateResult::Matrix(m) => Ok(m),
            AggregateResult::Streamed(h) => h.load_matrix(),
        }
    }
}

/// Estimated dataset size in MB (`wl × freq × 8 / 1e6`).
pub fn estimate_memory_mb(wavelength_points: usize, frequency_points: usize) -> f64 {
    wavelength_points as f64 * frequency_points as f64 * 8.0 / 1e6
}

enum Sink {
    Undecided,
    Memory(DataMatrix),
    Stream(StreamedStore),
}

/// Per-session dataset builder. Single writer.
pub struct DataAggregator {
    threshold_mb: f64,
    stream_dir: PathBuf,
    stream_stem: String,
    sink: Sink,
    frequency_points: Option<usize>,
}

impl DataAggregator {
    /// Aggregator with an in-memory budget of `threshold_mb`, streaming into `stream_dir`.
    pub fn new(threshold_mb: f64, stream_dir: impl Into<PathBuf>) -> Self {
        Self {
            threshold_mb,
            stream_dir: stream_dir.into(),
            stream_stem: "scan".to_string(),
            sink: Sink::Undecided,
            frequency_points: None,
        }
    }

    /// Build from the `[storage]` settings section.
    pub fn from_settings(settings: &StorageSettings) -> Self {
        Self::new(settings.memory_threshold_mb, settings.stream_dir.clone())
    }

    /// File stem used for the streamed store (default `scan`)
    pub fn with_stream_stem(mut self, stem: impl Into<String>) -> Self {
        self.stream_stem = stem.into();
        self
    }

    /// In-memory budget in MB
    pub fn threshold_mb(&self) -> f64 {
        self.threshold_mb
    }

    /// Chosen mode, `None` until the first column decides it
    pub fn mode(&self) -> Option<StorageMode> {
        match self.sink {
            Sink::Undecided => None,
            Sink::Memory(_) => Some(StorageMode::InMemory),
            Sink::Stream(_) => Some(StorageMode::Streamed),
        }
    }

    /// Frequency points fixed by the first stored column
    pub fn frequency_points(&self) -> Option<usize> {
        self.frequency_points
    }

    /// Columns stored so far
    pub fn column_count(&self) -> usize {
        match &self.sink {
            Sink::Undecided => 0,
            Sink::Memory(m) => m.columns(),
            Sink::Stream(s) => s.columns(),
        }
    }

    /// Pick the storage mode for the expected dataset. Once per session.
    ///
    /// Streamed mode opens the append target immediately; failure to do so is
    /// a [`DaqError::Resource`].
    pub fn choose_storage_mode(
        &mut self,
        wavelength_points: usize,
        frequency_points: usize,
    ) -> AppResult<StorageDecision> {
        if !matches!(self.sink, Sink::Undecided) {
            return Err(DaqError::StorageModeAlreadyChosen);
        }

        let estimated_mb = estimate_memory_mb(wavelength_points, frequency_points);
        let mode = if estimated_mb > self.threshold_mb {
            warn!(
                estimated_mb,
                threshold_mb = self.threshold_mb,
                "Estimated dataset exceeds memory budget, streaming to disk"
            );
            self.sink = Sink::Stream(StreamedStore::open(&self.stream_dir, &self.stream_stem)?);
            StorageMode::Streamed
        } else {
            // rows are fixed by the first column
            self.sink = Sink::Memory(DataMatrix::with_rows(0));
            StorageMode::InMemory
        };

        info!(%mode, estimated_mb, wavelength_points, frequency_points, "Storage mode chosen");
        Ok(StorageDecision {
            mode,
            estimated_mb,
            threshold_mb: self.threshold_mb,
        })
    }

    /// Append the powers of one wavelength step.
    ///
    /// A length other than the established frequency-point count is a
    /// [`DaqError::DataConsistency`]; the column is dropped and the column count
    /// is unchanged.
    pub fn append_column(&mut self, powers: &[f64], wavelength_nm: f64) -> AppResult<()> {
        if powers.is_empty() {
            return Err(DaqError::DataConsistency {
                expected: self.frequency_points.unwrap_or(0),
                actual: 0,
            });
        }
        if let Some(expected) = self.frequency_points {
            if powers.len() != expected {
                warn!(expected, actual = powers.len(), wavelength_nm, "Column dropped");
                return Err(DaqError::DataConsistency {
                    expected,
                    actual: powers.len(),
                });
            }
        }

        match &mut self.sink {
            Sink::Undecided => {
                return Err(DaqError::InvalidState(
                    "storage mode must be chosen before appending".to_string(),
                ))
            }
            Sink::Memory(matrix) => {
                if self.frequency_points.is_none() {
                    *matrix = DataMatrix::with_rows(powers.len());
                }
                matrix.push_column(wavelength_nm, powers);
            }
            Sink::Stream(store) => store.append(wavelength_nm, powers)?,
        }

        if self.frequency_points.is_none() {
            debug!(frequency_points = powers.len(), "Frequency points established");
            self.frequency_points = Some(powers.len());
        }
        Ok(())
    }

    /// Close the dataset. Streamed stores are flushed and their manifest written.
    pub fn finalize(self) -> AppResult<AggregateResult> {
        match self.sink {
            Sink::Undecided => Err(DaqError::InvalidState(
                "nothing to finalize, storage mode never chosen".to_string(),
            )),
            Sink::Memory(matrix) => Ok(AggregateResult::Matrix(matrix)),
            Sink::Stream(mut store) => Ok(AggregateResult::Streamed(store.close()?)),
        }
    }
}
