//! # Sweep DAQ Core Library
//!
//! Swept-wavelength spectrum acquisition. A tunable source is stepped through
//! a wavelength range; at each step a spectrum analyzer trace is captured and
//! stored as one column of a frequency × wavelength power matrix, while
//! progress and alarms are broadcast to listeners.
//!
//! ## Crate Structure
//!
//! - **`config`**: Layered `Settings` (defaults, TOML, environment) via figment.
//! - **`error`**: The `DaqError` enum and `AppResult` alias.
//! - **`logging`**: tracing-subscriber initialisation.
//! - **`hardware`**: Capability traits for the source and the analyzer, the
//!   sweep-point policy, power control helpers and simulated instruments.
//! - **`scan`**: The `ScanOrchestrator` state machine and its pure helpers
//!   (stepper, alarm monitor, progress reporter, sampler).
//! - **`data`**: Storage-mode decision, column assembly, the streamed column
//!   store and table export.

pub mod config;
pub mod data;
pub mod error;
pub mod hardware;
pub mod logging;
pub mod scan;

pub use error::{AppResult, DaqError};
