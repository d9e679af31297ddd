//! Dataset assembly, disk streaming and export.

pub mod aggregator;
pub mod column_store;
pub mod export;
pub mod matrix;

pub use aggregator::{
    estimate_memory_mb, AggregateResult, DataAggregator, StorageDecision, StorageMode,
};
pub use column_store::{StorageHandle, StorageManifest, StreamedStore};
pub use export::{export_matrix, ExportFormat, Hdf5Exporter, TableExporter};
pub use matrix::DataMatrix;
