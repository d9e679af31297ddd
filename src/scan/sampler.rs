//! Bounded-time spectrum acquisition.

use crate::error::{AppResult, DaqError};
use crate::hardware::SpectrumAnalyzer;
use crate::scan::frame::SpectrumFrame;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::debug;

/// Result of one acquisition attempt.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    /// A non-empty trace arrived in time
    Acquired(SpectrumFrame),
    /// Timeout, adapter error or empty trace. The step counts as attempted.
    Skipped { reason: String },
}

/// Run a device call under `limit`. Timeouts and errors become
/// [`DaqError::DeviceComm`].
pub async fn bounded<T, F>(operation: &str, limit: Duration, call: F) -> AppResult<T>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(DaqError::DeviceComm(format!("{operation} failed: {e}"))),
        Err(_) => Err(DaqError::DeviceComm(format!(
            "{operation} timed out after {} ms",
            limit.as_millis()
        ))),
    }
}

/// Wraps an analyzer so each acquisition is bounded in time.
pub struct SpectrumSampler {
    analyzer: Arc<dyn SpectrumAnalyzer>,
    timeout: Duration,
}

impl SpectrumSampler {
    /// Sampler whose acquisitions give up after `timeout`
    pub fn new(analyzer: Arc<dyn SpectrumAnalyzer>, timeout: Duration) -> Self {
        Self { analyzer, timeout }
    }

    /// Acquire one frame. An empty trace is reported like a device error.
    pub async fn acquire(&self) -> AppResult<SpectrumFrame> {
        let trace = bounded("acquire_spectrum", self.timeout, self.analyzer.acquire_spectrum())
            .await?;
        if trace.powers.is_empty() {
            return Err(DaqError::DeviceComm(
                "acquire_spectrum returned an empty trace".to_string(),
            ));
        }
        debug!(points = trace.powers.len(), "Spectrum acquired");
        Ok(trace.into())
    }

    /// Like [`acquire`](Self::acquire), with failures folded into [`StepOutcome::Skipped`].
    pub async fn sample(&self) -> StepOutcome {
        match self.acquire().await {
            Ok(frame) => StepOutcome::Acquired(frame),
            Err(e) => StepOutcome::Skipped {
                reason: e.to_string(),
            },
        }
    }
}
