//! Instrument abstractions
//!
//! Capability traits for the swept source and the spectrum analyzer, the
//! sweep-point policy shared by every analyzer, and simulated instruments.

pub mod capabilities;
pub mod mock;
pub mod source;
pub mod sweep_points;

pub use capabilities::{
    AnalyzerSettings, SourcePowerControl, SpectrumAnalyzer, SpectrumTrace, WavelengthTunable,
};
pub use source::PowerController;
pub use sweep_points::{recommended_sweep_points, SweepPointRecommendation};
