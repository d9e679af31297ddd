//! Table export of a finished scan.
//!
//! The matrix is written with one row per frequency bin and one column per
//! wavelength step, headed `WL_1..WL_n`. Text formats use six decimal places.
//! The JSON format additionally carries shape, wavelengths and a timestamp.
//! HDF5 output (`.h5`/`.hdf5`) is built with the `storage_hdf5` feature.

use crate::data::matrix::DataMatrix;
use crate::error::{AppResult, DaqError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// Supported table formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma separated
    Csv,
    /// Tab separated
    Txt,
    /// Structured, with metadata
    Json,
    /// `power_data` dataset with attributes (feature `storage_hdf5`)
    Hdf5,
}

impl ExportFormat {
    /// Infer the format from a file extension (case-insensitive).
    pub fn from_path(path: &Path) -> AppResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        match ext.as_deref() {
            Some("csv") => Ok(ExportFormat::Csv),
            Some("txt") | Some("tsv") => Ok(ExportFormat::Txt),
            Some("json") => Ok(ExportFormat::Json),
            Some("h5") | Some("hdf5") => Ok(ExportFormat::Hdf5),
            other => Err(DaqError::Export(format!(
                "Unsupported export extension {:?} for {}",
                other.unwrap_or(""),
                path.display()
            ))),
        }
    }

    /// Canonical file extension
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Txt => "txt",
            ExportFormat::Json => "json",
            ExportFormat::Hdf5 => "h5",
        }
    }
}

/// Writes a [`DataMatrix`] to a file.
pub trait TableExporter {
    /// Format this exporter writes
    fn format(&self) -> ExportFormat;

    /// Write `matrix` to `path`, replacing any existing file
    fn export(&self, matrix: &DataMatrix, path: &Path) -> AppResult<()>;
}

/// Column headers `WL_1..WL_n`
pub fn column_headers(columns: usize) -> Vec<String> {
    (1..=columns).map(|i| format!("WL_{i}")).collect()
}

fn ensure_exportable(matrix: &DataMatrix) -> AppResult<()> {
    if matrix.is_empty() {
        return Err(DaqError::Export("No scan data to export".to_string()));
    }
    Ok(())
}

/// CSV and tab-separated text.
pub struct DelimitedExporter {
    delimiter: u8,
    format: ExportFormat,
}

impl DelimitedExporter {
    /// Comma-separated exporter
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            format: ExportFormat::Csv,
        }
    }

    /// Tab-separated exporter
    pub fn txt() -> Self {
        Self {
            delimiter: b'\t',
            format: ExportFormat::Txt,
        }
    }
}

impl TableExporter for DelimitedExporter {
    fn format(&self) -> ExportFormat {
        self.format
    }

    fn export(&self, matrix: &DataMatrix, path: &Path) -> AppResult<()> {
        ensure_exportable(matrix)?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .from_path(path)?;
        writer.write_record(column_headers(matrix.columns()))?;

        let mut record = Vec::with_capacity(matrix.columns());
        for row in 0..matrix.rows() {
            record.clear();
            record.extend(matrix.row(row).map(|v| format!("{v:.6}")));
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonTable<'a> {
    metadata: JsonMetadata<'a>,
    columns: Vec<String>,
    /// Row-major: `data[frequency_bin][wavelength_step]`
    data: Vec<Vec<f64>>,
}

#[derive(Serialize)]
struct JsonMetadata<'a> {
    frequency_count: usize,
    wavelength_count: usize,
    wavelengths_nm: &'a [f64],
    timestamp: DateTime<Utc>,
}

/// JSON document with metadata.
pub struct JsonExporter;

impl TableExporter for JsonExporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Json
    }

    fn export(&self, matrix: &DataMatrix, path: &Path) -> AppResult<()> {
        ensure_exportable(matrix)?;

        let table = JsonTable {
            metadata: JsonMetadata {
                frequency_count: matrix.rows(),
                wavelength_count: matrix.columns(),
                wavelengths_nm: matrix.wavelengths_nm(),
                timestamp: Utc::now(),
            },
            columns: column_headers(matrix.columns()),
            data: (0..matrix.rows()).map(|r| matrix.row(r).collect()).collect(),
        };

        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), &table)?;
        Ok(())
    }
}

/// HDF5 file laid out for downstream analysis tools.
///
/// `power_data` is a `rows × columns` f64 dataset (frequency rows, wavelength
/// columns) with `description`, `frequency_count`, `wavelength_count` and
/// `timestamp` attributes. 1-based `frequency_index` and `wavelength_index`
/// datasets and the `wavelengths_nm` list sit beside it.
pub struct Hdf5Exporter;

impl TableExporter for Hdf5Exporter {
    fn format(&self) -> ExportFormat {
        ExportFormat::Hdf5
    }

    #[cfg(feature = "storage_hdf5")]
    fn export(&self, matrix: &DataMatrix, path: &Path) -> AppResult<()> {
        ensure_exportable(matrix)?;
        write_hdf5(matrix, path).map_err(|e| {
            DaqError::Export(format!("HDF5 write to {} failed: {e:#}", path.display()))
        })
    }

    #[cfg(not(feature = "storage_hdf5"))]
    fn export(&self, _matrix: &DataMatrix, path: &Path) -> AppResult<()> {
        Err(DaqError::Export(format!(
            "Cannot write {}: HDF5 support is not enabled. Please build with --features storage_hdf5",
            path.display()
        )))
    }
}

#[cfg(feature = "storage_hdf5")]
fn write_hdf5(matrix: &DataMatrix, path: &Path) -> anyhow::Result<()> {
    use hdf5::types::VarLenUnicode;

    let (rows, columns) = matrix.shape();
    let row_major: Vec<f64> = (0..rows).flat_map(|r| matrix.row(r)).collect();

    let file = hdf5::File::create(path)?;
    let power = file
        .new_dataset::<f64>()
        .shape((rows, columns))
        .create("power_data")?;
    power.write_raw(&row_major)?;

    power
        .new_attr::<VarLenUnicode>()
        .create("description")?
        .write_scalar(&"Laser scan power (dBm): frequency (rows) x wavelength (columns)"
            .parse::<VarLenUnicode>()?)?;
    power
        .new_attr::<u64>()
        .create("frequency_count")?
        .write_scalar(&(rows as u64))?;
    power
        .new_attr::<u64>()
        .create("wavelength_count")?
        .write_scalar(&(columns as u64))?;
    power
        .new_attr::<VarLenUnicode>()
        .create("timestamp")?
        .write_scalar(&Utc::now().to_rfc3339().parse::<VarLenUnicode>()?)?;

    let wavelength_index: Vec<u64> = (1..=columns as u64).collect();
    file.new_dataset::<u64>()
        .shape(columns)
        .create("wavelength_index")?
        .write_raw(&wavelength_index)?;
    let frequency_index: Vec<u64> = (1..=rows as u64).collect();
    file.new_dataset::<u64>()
        .shape(rows)
        .create("frequency_index")?
        .write_raw(&frequency_index)?;
    file.new_dataset::<f64>()
        .shape(columns)
        .create("wavelengths_nm")?
        .write_raw(matrix.wavelengths_nm())?;

    Ok(())
}

/// Exporter for a format
pub fn exporter_for(format: ExportFormat) -> Box<dyn TableExporter> {
    match format {
        ExportFormat::Csv => Box::new(DelimitedExporter::csv()),
        ExportFormat::Txt => Box::new(DelimitedExporter::txt()),
        ExportFormat::Json => Box::new(JsonExporter),
        ExportFormat::Hdf5 => Box::new(Hdf5Exporter),
    }
}

/// Export to `path`, choosing the format from its extension.
pub fn export_matrix(matrix: &DataMatrix, path: &Path) -> AppResult<ExportFormat> {
    let format = ExportFormat::from_path(path)?;
    exporter_for(format).export(matrix, path)?;
    info!(
        path = %path.display(),
        format = format.extension(),
        rows = matrix.rows(),
        columns = matrix.columns(),
        "Scan data exported"
    );
    Ok(format)
}
