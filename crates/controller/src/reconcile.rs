use std::collections::HashMap;

use chrono::{Local, NaiveTime};
use serde::{Deserialize, Serialize};
use shared::domain::{
    hue_brightness, hue_color_temperature, CurveId, CurveKind, Light, LightPatch,
    ReportedLightState, SmartOffBaseline, Status, BRI_SCALE,
};
use tracing::{debug, info, warn};

use crate::{curves::resolve_curve, curve_x_at, smart_off, Controller, Result};

/// Counts of what one reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickReport {
    pub dispatched: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LightOutcome {
    Dispatched,
    Unchanged,
    Skipped,
}

/// Target state for a light from its curve values. `bri` is the raw curve
/// value and is scaled by the light's ceiling here; either value may be
/// absent when the capability is not needed.
pub fn curve_patch(light: &Light, bri: Option<f64>, ct: Option<f64>) -> LightPatch {
    if !light.on {
        return if light.on_controlled {
            LightPatch::off()
        } else {
            LightPatch::default()
        };
    }

    let mut patch = LightPatch::default();
    if light.ct_controlled {
        patch.ct = ct.map(hue_color_temperature);
    }
    if let Some(bri) = bri {
        let scaled = bri * light.bri_max / BRI_SCALE;
        if light.bri_controlled && scaled > 0.0 {
            patch.bri = Some(hue_brightness(scaled));
        }
        if light.on_controlled {
            patch.on = Some(scaled > light.on_threshold);
        }
    }
    patch
}

/// Drops what the device already shows. Turning off a light that is off
/// sends nothing at all.
pub fn suppress_redundant(mut patch: LightPatch, reported: &ReportedLightState) -> LightPatch {
    if patch.on == Some(false) && !reported.on {
        return LightPatch::default();
    }
    if patch.on == Some(reported.on) {
        patch.on = None;
    }
    patch
}

impl Controller {
    pub async fn status(&self) -> Result<Status> {
        Ok(self.storage.status().await?)
    }

    pub async fn set_status(&self, enabled: bool) -> Result<Status> {
        let status = Status { enabled };
        self.storage.set_status(status).await?;
        info!(enabled, "reconcile: status changed");
        Ok(status)
    }

    /// One reconciliation pass at the current local time.
    pub async fn reconcile(&self, force_disable: bool) -> Result<TickReport> {
        self.reconcile_at(force_disable, Local::now().time()).await
    }

    /// One reconciliation pass as if the clock read `time`.
    ///
    /// While disabled nothing is sent, unless `force_disable` asks for every
    /// on-controlled light to be switched off. While enabled each light is
    /// brought to its curve values with the smallest patch that gets it
    /// there; a failing light is logged and counted, the pass goes on.
    pub async fn reconcile_at(&self, force_disable: bool, time: NaiveTime) -> Result<TickReport> {
        let status = self.storage.status().await?;
        let lights = self.storage.list_lights().await?;
        if !status.enabled {
            if force_disable {
                return Ok(self.switch_off_controlled(&lights).await);
            }
            debug!("reconcile: disabled");
            return Ok(TickReport::default());
        }

        let settings = self.storage.settings().await?;
        let reported = self.gateway.all_light_states().await?;
        let x = f64::from(curve_x_at(time));

        let mut report = TickReport::default();
        let mut live = HashMap::new();
        for light in &lights {
            match self
                .reconcile_light(light, reported.get(&light.id), settings.smart_off, x, &mut live)
                .await
            {
                Ok(LightOutcome::Dispatched) => report.dispatched += 1,
                Ok(LightOutcome::Unchanged) => report.unchanged += 1,
                Ok(LightOutcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(light_id = light.id.0, error = %err, "reconcile: light failed");
                }
            }
        }

        let pruned = self.cache.retain_live(&live).await;
        debug!(pruned, "reconcile: spline cache pruned");
        info!(
            x,
            dispatched = report.dispatched,
            unchanged = report.unchanged,
            skipped = report.skipped,
            failed = report.failed,
            "reconcile: tick complete"
        );
        Ok(report)
    }

    async fn switch_off_controlled(&self, lights: &[Light]) -> TickReport {
        let mut report = TickReport::default();
        for light in lights.iter().filter(|light| light.on_controlled) {
            match self
                .gateway
                .set_light_state(light.id, &LightPatch::off())
                .await
            {
                Ok(()) => report.dispatched += 1,
                Err(err) => {
                    report.failed += 1;
                    warn!(light_id = light.id.0, error = %err, "reconcile: forced off failed");
                }
            }
        }
        info!(switched_off = report.dispatched, failed = report.failed, "reconcile: forced off");
        report
    }

    async fn reconcile_light(
        &self,
        light: &Light,
        reported: Option<&ReportedLightState>,
        smart_off_enabled: bool,
        x: f64,
        live: &mut HashMap<CurveId, i64>,
    ) -> Result<LightOutcome> {
        let Some(reported) = reported else {
            warn!(light_id = light.id.0, "reconcile: light not reported by bridge");
            return Ok(LightOutcome::Skipped);
        };
        if !reported.reachable {
            debug!(light_id = light.id.0, "reconcile: light unreachable");
            return Ok(LightOutcome::Skipped);
        }

        if smart_off_enabled && smart_off::is_overridden(light, reported) {
            if !light.smart_off.active {
                info!(light_id = light.id.0, name = %light.name, "smart-off: manual change detected");
            }
            let baseline = smart_off::follow(reported);
            if baseline != light.smart_off {
                self.storage.save_smart_off(light.id, &baseline).await?;
            }
            return Ok(LightOutcome::Skipped);
        }

        let desired = if light.on {
            let bri = if light.bri_controlled || light.on_controlled {
                Some(self.light_curve_value(light, CurveKind::Bri, x, live).await?)
            } else {
                None
            };
            let ct = if light.ct_controlled {
                Some(self.light_curve_value(light, CurveKind::Ct, x, live).await?)
            } else {
                None
            };
            curve_patch(light, bri, ct)
        } else {
            curve_patch(light, None, None)
        };

        let patch = suppress_redundant(desired, reported);
        if patch.is_empty() {
            return Ok(LightOutcome::Unchanged);
        }
        self.gateway.set_light_state(light.id, &patch).await?;
        debug!(light_id = light.id.0, ?patch, "reconcile: dispatched");

        if smart_off_enabled {
            let observed = match self.gateway.light_state(light.id).await {
                Ok(observed) => observed,
                Err(err) => {
                    debug!(light_id = light.id.0, error = %err, "reconcile: read-back failed; assuming patch applied");
                    reported.overlay(&patch)
                }
            };
            self.storage
                .save_smart_off(light.id, &SmartOffBaseline::from_reported(&observed))
                .await?;
        }
        Ok(LightOutcome::Dispatched)
    }

    async fn light_curve_value(
        &self,
        light: &Light,
        kind: CurveKind,
        x: f64,
        live: &mut HashMap<CurveId, i64>,
    ) -> Result<f64> {
        let curve = resolve_curve(&self.storage, light, kind).await?;
        live.insert(curve.id, curve.revision);
        self.curve_value(&curve, x).await
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
