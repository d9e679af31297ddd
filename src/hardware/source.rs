//! Out-of-band source power handling.
//!
//! Power edits from an operator arrive in bursts; commands are only forwarded
//! when the value moves by more than [`POWER_DEADBAND_DB`].

use crate::hardware::capabilities::SourcePowerControl;
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Smallest power change worth sending to the source.
pub const POWER_DEADBAND_DB: f64 = 0.05;

/// Wraps a [`SourcePowerControl`] and suppresses redundant power commands.
pub struct PowerController {
    source: Arc<dyn SourcePowerControl>,
    last_power_dbm: Mutex<Option<f64>>,
}

impl PowerController {
    /// Wrap `source`. No power has been sent yet.
    pub fn new(source: Arc<dyn SourcePowerControl>) -> Self {
        Self {
            source,
            last_power_dbm: Mutex::new(None),
        }
    }

    /// Set output power unless it is within the dead-band of the last value sent.
    ///
    /// Returns `true` when a command was issued. Values within 1e-3 dB of zero
    /// are sent as exactly zero.
    pub async fn set_power_if_changed(&self, dbm: f64) -> Result<bool> {
        let dbm = if dbm.abs() < 1e-3 { 0.0 } else { dbm };
        let (min, max) = self.source.power_range();
        if !(min..=max).contains(&dbm) {
            bail!("Power {dbm} dBm outside range {min}..={max} dBm");
        }

        let mut last = self.last_power_dbm.lock().await;
        if let Some(prev) = *last {
            if (prev - dbm).abs() < POWER_DEADBAND_DB {
                debug!(requested = dbm, last = prev, "Power change within dead-band, skipped");
                return Ok(false);
            }
        }

        self.source.set_power(dbm).await?;
        *last = Some(dbm);
        info!(power_dbm = dbm, "Source power set");
        Ok(true)
    }

    /// Switch the optical output on or off
    pub async fn set_output_enabled(&self, enabled: bool) -> Result<()> {
        self.source.set_output_enabled(enabled).await
    }

    /// Switch APC mode and verify the source reports the requested mode.
    pub async fn set_apc_enabled(&self, enabled: bool) -> Result<()> {
        self.source.set_apc_enabled(enabled).await?;
        let actual = self.source.is_apc_enabled().await?;
        if actual != enabled {
            bail!("APC mode mismatch: requested {enabled}, source reports {actual}");
        }
        Ok(())
    }
}
