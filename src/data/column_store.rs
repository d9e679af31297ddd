//! Append-only column store for scans too large to keep in memory.
//!
//! The data file is an Arrow IPC stream with a single `power_dbm` field. Each
//! wavelength column is one `RecordBatch` of `rows` values, so an append costs
//! the same however many columns are already stored. Shape and wavelengths
//! are recorded in a JSON manifest written when the store is closed.
//!
//! The byte length after the last complete batch is tracked; a failed append
//! truncates the file back to it, so a closed store only ever describes
//! batches that were fully written.

use crate::data::matrix::DataMatrix;
use crate::error::{AppResult, DaqError};
use arrow::array::{Array, ArrayRef, Float64Array, Float64Builder};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use arrow::ipc::reader::StreamReader;
use arrow::ipc::writer::StreamWriter;
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Layout tag written into every manifest
pub const COLUMN_STORE_LAYOUT: &str = "arrow-ipc-stream/batch-per-column";

/// Name of the single field in every batch
pub const POWER_FIELD: &str = "power_dbm";

/// Sidecar metadata describing a closed store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageManifest {
    /// Always [`COLUMN_STORE_LAYOUT`]
    pub layout: String,
    /// Arrow stream holding the columns
    pub data_file: PathBuf,
    /// Frequency points per column
    pub rows: usize,
    /// Wavelength steps stored
    pub columns: usize,
    /// Wavelength of each stored column, in order
    pub wavelengths_nm: Vec<f64>,
    /// When the store was opened
    pub created_at: DateTime<Utc>,
    /// When the store was closed
    pub closed_at: DateTime<Utc>,
}

fn power_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new(
        POWER_FIELD,
        DataType::Float64,
        false,
    )]))
}

/// Open, writable column store.
pub struct StreamedStore {
    data_path: PathBuf,
    manifest_path: PathBuf,
    schema: SchemaRef,
    writer: Option<StreamWriter<File>>,
    /// File length after the last complete batch
    committed_len: u64,
    rows: Option<usize>,
    wavelengths_nm: Vec<f64>,
    created_at: DateTime<Utc>,
}

impl StreamedStore {
    /// Create `<dir>/<stem>.arrows`, creating `dir` if needed.
    pub fn open(dir: &Path, stem: &str) -> AppResult<Self> {
        fs::create_dir_all(dir).map_err(|e| {
            DaqError::Resource(format!("Cannot create stream directory {}: {e}", dir.display()))
        })?;

        let data_path = dir.join(format!("{stem}.arrows"));
        let manifest_path = dir.join(format!("{stem}.json"));
        let file = File::create(&data_path).map_err(|e| {
            DaqError::Resource(format!("Cannot create {}: {e}", data_path.display()))
        })?;

        let schema = power_schema();
        let mut writer = StreamWriter::try_new(file, &schema).map_err(|e| {
            DaqError::Resource(format!("Cannot start stream {}: {e}", data_path.display()))
        })?;
        let committed_len = writer.get_mut().stream_position()?;

        info!(path = %data_path.display(), "Opened streamed column store");
        Ok(Self {
            data_path,
            manifest_path,
            schema,
            writer: Some(writer),
            committed_len,
            rows: None,
            wavelengths_nm: Vec::new(),
            created_at: Utc::now(),
        })
    }

    /// Path of the Arrow stream
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Columns committed so far
    pub fn columns(&self) -> usize {
        self.wavelengths_nm.len()
    }

    /// Append one column.
    ///
    /// The first column fixes the row count; later columns of a different
    /// length are refused without touching the file.
    pub fn append(&mut self, wavelength_nm: f64, column: &[f64]) -> AppResult<()> {
        if let Some(rows) = self.rows {
            if column.len() != rows {
                return Err(DaqError::DataConsistency {
                    expected: rows,
                    actual: column.len(),
                });
            }
        }

        let mut builder = Float64Builder::with_capacity(column.len());
        builder.append_slice(column);
        let values: ArrayRef = Arc::new(builder.finish());
        let batch = RecordBatch::try_new(Arc::clone(&self.schema), vec![values])?;

        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| DaqError::Resource("Column store already closed".to_string()))?;

        let written = writer
            .write(&batch)
            .map_err(|e| e.to_string())
            .and_then(|()| writer.get_mut().stream_position().map_err(|e| e.to_string()));
        match written {
            Ok(position) => self.committed_len = position,
            Err(reason) => {
                self.rollback_uncommitted();
                return Err(DaqError::Resource(format!(
                    "Write to {} failed: {reason}",
                    self.data_path.display()
                )));
            }
        }

        self.rows.get_or_insert(column.len());
        self.wavelengths_nm.push(wavelength_nm);
        Ok(())
    }

    /// Cut the data file back to the last complete batch.
    fn rollback_uncommitted(&mut self) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        let file = writer.get_mut();
        let restored = file
            .set_len(self.committed_len)
            .and_then(|()| file.seek(SeekFrom::Start(self.committed_len)));
        match restored {
            Ok(_) => debug!(len = self.committed_len, "Rolled back partial column"),
            Err(e) => warn!(
                error = %e,
                path = %self.data_path.display(),
                "Cannot roll back partial column"
            ),
        }
    }

    /// Finish the stream, sync it and write the manifest.
    pub fn close(&mut self) -> AppResult<StorageHandle> {
        let mut writer = self
            .writer
            .take()
            .ok_or_else(|| DaqError::Resource("Column store already closed".to_string()))?;

        writer.finish().map_err(|e| {
            DaqError::Resource(format!("Cannot finish {}: {e}", self.data_path.display()))
        })?;
        let file = writer.into_inner().map_err(|e| {
            DaqError::Resource(format!("Flush of {} failed: {e}", self.data_path.display()))
        })?;
        file.sync_all().map_err(|e| {
            DaqError::Resource(format!("Sync of {} failed: {e}", self.data_path.display()))
        })?;

        let manifest = StorageManifest {
            layout: COLUMN_STORE_LAYOUT.to_string(),
            data_file: self.data_path.clone(),
            rows: self.rows.unwrap_or(0),
            columns: self.wavelengths_nm.len(),
            wavelengths_nm: self.wavelengths_nm.clone(),
            created_at: self.created_at,
            closed_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&manifest)?;
        fs::write(&self.manifest_path, json).map_err(|e| {
            DaqError::Resource(format!(
                "Cannot write manifest {}: {e}",
                self.manifest_path.display()
            ))
        })?;

        info!(
            rows = manifest.rows,
            columns = manifest.columns,
            path = %self.data_path.display(),
            "Closed streamed column store"
        );

        Ok(StorageHandle {
            data_path: self.data_path.clone(),
            manifest_path: self.manifest_path.clone(),
            rows: manifest.rows,
            columns: manifest.columns,
        })
    }
}

impl Drop for StreamedStore {
    fn drop(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            warn!(path = %self.data_path.display(), "Column store dropped without close");
            if let Err(e) = writer.finish() {
                warn!(error = %e, "Finishing stream on drop failed");
            }
        }
    }
}

/// Reference to a closed column store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageHandle {
    /// Arrow stream holding the columns
    pub data_path: PathBuf,
    /// JSON manifest beside it
    pub manifest_path: PathBuf,
    /// Frequency points per column
    pub rows: usize,
    /// Stored columns
    pub columns: usize,
}

impl StorageHandle {
    /// Reopen a handle from its manifest file.
    pub fn from_manifest(manifest_path: &Path) -> AppResult<Self> {
        let manifest = Self::read_manifest_at(manifest_path)?;
        Ok(Self {
            data_path: manifest.data_file,
            manifest_path: manifest_path.to_path_buf(),
            rows: manifest.rows,
            columns: manifest.columns,
        })
    }

    /// `(rows, columns)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns)
    }

    /// Read the manifest back from disk
    pub fn read_manifest(&self) -> AppResult<StorageManifest> {
        Self::read_manifest_at(&self.manifest_path)
    }

    fn read_manifest_at(path: &Path) -> AppResult<StorageManifest> {
        let bytes = fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Read the whole store back into memory.
    ///
    /// Only the batches the manifest accounts for are read.
    pub fn load_matrix(&self) -> AppResult<DataMatrix> {
        let manifest = self.read_manifest()?;
        let file = File::open(&self.data_path)?;
        let reader = StreamReader::try_new(BufReader::new(file), None)?;

        let mut values = Vec::with_capacity(manifest.rows * manifest.columns);
        for (index, batch) in reader.take(manifest.columns).enumerate() {
            let batch = batch?;
            let column = batch
                .column(0)
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| {
                    DaqError::Resource(format!("Column {index} is not {POWER_FIELD} f64 data"))
                })?;
            if column.len() != manifest.rows || column.null_count() > 0 {
                return Err(DaqError::Resource(format!(
                    "Column {index} holds {} values, manifest describes {}",
                    column.len(),
                    manifest.rows
                )));
            }
            values.extend_from_slice(column.values());
        }

        if values.len() != manifest.rows * manifest.columns {
            return Err(DaqError::Resource(format!(
                "{} ends after {} of {} columns",
                self.data_path.display(),
                values.len() / manifest.rows.max(1),
                manifest.columns
            )));
        }

        debug!(rows = manifest.rows, columns = manifest.columns, "Loaded streamed matrix");
        DataMatrix::from_columns(manifest.rows, manifest.wavelengths_nm, values).ok_or_else(|| {
            DaqError::Resource("Manifest wavelengths disagree with column count".to_string())
        })
    }
}
