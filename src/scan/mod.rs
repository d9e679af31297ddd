//! Swept acquisition engine.
//!
//! [`ScanOrchestrator`] composes the pure pieces ([`WavelengthStepper`],
//! [`AlarmMonitor`], [`ProgressReporter`]) with the device adapters and the
//! [`DataAggregator`](crate::data::DataAggregator).

pub mod alarm;
pub mod config;
pub mod events;
pub mod frame;
pub mod orchestrator;
pub mod progress;
pub mod sampler;
pub mod session;
pub mod stepper;

pub use alarm::{AlarmLevel, AlarmMonitor, Severity};
pub use config::ScanConfig;
pub use events::ScanEvent;
pub use frame::{frequency_axis, SpectrumFrame};
pub use orchestrator::{ScanOrchestrator, ScanReport};
pub use progress::ProgressReporter;
pub use sampler::{SpectrumSampler, StepOutcome};
pub use session::{ScanSession, ScanState, ScanSummary};
pub use stepper::WavelengthStepper;
