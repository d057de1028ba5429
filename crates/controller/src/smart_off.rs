//! Manual override detection.
//!
//! The baseline stores what the controller last commanded. A light whose
//! reported state moved away from it was changed by a person; it stays out
//! of reconciliation until the override is deliberately reset.

use shared::domain::{Light, LightId, ReportedLightState, Settings, SmartOffBaseline};
use tracing::{info, warn};

use crate::{Controller, Result};

/// Whether a controlled capability differs from the commanded baseline.
/// Capabilities without a baseline value never count as diverged.
pub fn diverged(light: &Light, reported: &ReportedLightState) -> bool {
    let baseline = &light.smart_off;
    let on = light.on_controlled && baseline.on.is_some_and(|on| on != reported.on);
    let bri = light.bri_controlled && baseline.bri.is_some_and(|bri| Some(bri) != reported.bri);
    let ct = light.ct_controlled && baseline.ct.is_some_and(|ct| Some(ct) != reported.ct);
    on || bri || ct
}

/// Overrides are sticky: once detected they hold until reset.
pub fn is_overridden(light: &Light, reported: &ReportedLightState) -> bool {
    light.smart_off.active || diverged(light, reported)
}

/// Baseline for an overridden light, following the person's latest choice.
pub fn follow(reported: &ReportedLightState) -> SmartOffBaseline {
    SmartOffBaseline {
        active: true,
        ..SmartOffBaseline::from_reported(reported)
    }
}

impl Controller {
    /// Clears the override of one light, taking its current device state as
    /// the new baseline. An unreadable device gets an empty baseline.
    pub async fn reset_smart_off(&self, light_id: LightId) -> Result<SmartOffBaseline> {
        let baseline = match self.gateway.light_state(light_id).await {
            Ok(reported) => SmartOffBaseline::from_reported(&reported),
            Err(err) => {
                warn!(light_id = light_id.0, error = %err, "smart-off: device state unavailable; clearing baseline");
                SmartOffBaseline::default()
            }
        };
        self.storage.save_smart_off(light_id, &baseline).await?;
        Ok(baseline)
    }

    /// Clears the override of every light from one fleet read. Returns the
    /// number of lights reset.
    pub async fn reset_all_smart_off(&self) -> Result<usize> {
        let lights = self.storage.list_lights().await?;
        let reported = match self.gateway.all_light_states().await {
            Ok(reported) => reported,
            Err(err) => {
                warn!(error = %err, "smart-off: fleet state unavailable; clearing baselines");
                Default::default()
            }
        };
        for light in &lights {
            let baseline = reported
                .get(&light.id)
                .map(SmartOffBaseline::from_reported)
                .unwrap_or_default();
            self.storage.save_smart_off(light.id, &baseline).await?;
        }
        Ok(lights.len())
    }

    pub async fn settings(&self) -> Result<Settings> {
        Ok(self.storage.settings().await?)
    }

    /// Toggles override detection. Baselines go stale while detection is
    /// off, so every change of the setting resets them.
    pub async fn set_smart_off(&self, enabled: bool) -> Result<Settings> {
        let current = self.storage.settings().await?;
        let settings = Settings { smart_off: enabled };
        self.storage.set_settings(settings).await?;
        if current.smart_off != enabled {
            let reset = self.reset_all_smart_off().await?;
            info!(enabled, lights = reset, "smart-off: setting changed; baselines reset");
        }
        Ok(settings)
    }
}

#[cfg(test)]
#[path = "tests/smart_off_tests.rs"]
mod tests;
