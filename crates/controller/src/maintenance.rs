use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{Controller, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaintenanceReport {
    pub offsets_reset: u64,
    pub overrides_reset: usize,
}

impl Controller {
    /// Nightly reset: zero every curve offset and hand every overridden
    /// light back to the controller.
    pub async fn reset_daily_offsets_and_overrides(&self) -> Result<MaintenanceReport> {
        let offsets_reset = self.storage.reset_offsets().await?;
        let overrides_reset = self.reset_all_smart_off().await?;
        let report = MaintenanceReport {
            offsets_reset,
            overrides_reset,
        };
        info!(
            offsets_reset = report.offsets_reset,
            overrides_reset = report.overrides_reset,
            "maintenance: daily reset complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "tests/maintenance_tests.rs"]
mod tests;
