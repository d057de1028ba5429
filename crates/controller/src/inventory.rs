use serde::{Deserialize, Serialize};
use shared::domain::{CurveId, CurveKind, GroupId, Light, LightId, LightUpdate, BRI_SCALE};
use tracing::info;

use crate::{notify::NotifyEvent, Controller, ControllerError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub added: usize,
    pub updated: usize,
    pub removed: u64,
    pub groups_added: usize,
    pub groups_updated: usize,
    pub groups_removed: u64,
}

impl Controller {
    /// Mirrors the bridge's fixture list: new fixtures are added with
    /// nothing controlled, known ones refreshed, vanished ones removed.
    /// Groups follow once the lights are in place.
    pub async fn sync_inventory(&self) -> Result<SyncReport> {
        let fixtures = self.gateway.inventory().await?;
        let mut report = SyncReport::default();
        for fixture in &fixtures {
            if self.storage.upsert_fixture(fixture).await? {
                info!(light_id = fixture.id.0, name = %fixture.name, "inventory: light added");
                report.added += 1;
            } else {
                report.updated += 1;
            }
        }
        let keep: Vec<LightId> = fixtures.iter().map(|fixture| fixture.id).collect();
        report.removed = self.storage.remove_lights_except(&keep).await?;

        let groups = self.gateway.groups().await?;
        for group in &groups {
            if self.storage.upsert_group(group).await? {
                info!(group_id = group.id.0, name = %group.name, "inventory: group added");
                report.groups_added += 1;
            } else {
                report.groups_updated += 1;
            }
        }
        let keep: Vec<GroupId> = groups.iter().map(|group| group.id).collect();
        report.groups_removed = self.storage.remove_groups_except(&keep).await?;
        info!(
            added = report.added,
            updated = report.updated,
            removed = report.removed,
            groups_added = report.groups_added,
            groups_updated = report.groups_updated,
            groups_removed = report.groups_removed,
            "inventory: synced"
        );
        Ok(report)
    }

    pub async fn list_lights(&self) -> Result<Vec<Light>> {
        Ok(self.storage.list_lights().await?)
    }

    pub async fn light(&self, light_id: LightId) -> Result<Light> {
        self.storage
            .light(light_id)
            .await?
            .ok_or_else(|| ControllerError::not_found(format!("light {light_id} not found")))
    }

    /// Applies a configuration change. Switching the app-level `on` flag
    /// fires the notifier; switching it off also clears the light's
    /// override.
    pub async fn update_light(&self, light_id: LightId, update: LightUpdate) -> Result<Light> {
        self.validate_light_update(&update).await?;
        self.apply_light_update(light_id, &update).await
    }

    pub(crate) async fn validate_light_update(&self, update: &LightUpdate) -> Result<()> {
        if let Some(threshold) = update.on_threshold {
            if !threshold.is_finite() {
                return Err(ControllerError::validation("on_threshold must be a finite number"));
            }
        }
        if let Some(bri_max) = update.bri_max {
            if !(0.0..=BRI_SCALE).contains(&bri_max) {
                return Err(ControllerError::validation(format!(
                    "bri_max must lie within [0, {BRI_SCALE}], got {bri_max}"
                )));
            }
        }
        if let Some(curve_id) = update.bri_curve_id {
            self.ensure_curve_kind(curve_id, CurveKind::Bri).await?;
        }
        if let Some(curve_id) = update.ct_curve_id {
            self.ensure_curve_kind(curve_id, CurveKind::Ct).await?;
        }
        Ok(())
    }

    /// Stores an already validated update.
    pub(crate) async fn apply_light_update(
        &self,
        light_id: LightId,
        update: &LightUpdate,
    ) -> Result<Light> {
        let mut light = self.light(light_id).await?;
        let was_on = light.on;
        update.apply_to(&mut light);
        self.storage.save_light_config(&light).await?;
        info!(light_id = light_id.0, "inventory: light updated");

        if light.on != was_on {
            self.notifier.notify(NotifyEvent::light_switched(&light)).await;
        }
        if update.on == Some(false) {
            light.smart_off = self.reset_smart_off(light_id).await?;
        }
        Ok(light)
    }

    async fn ensure_curve_kind(&self, curve_id: CurveId, kind: CurveKind) -> Result<()> {
        let curve = self.curve(curve_id).await?;
        if curve.kind != kind {
            return Err(ControllerError::validation(format!(
                "curve {curve_id} is a {} curve, expected {kind}",
                curve.kind
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/inventory_tests.rs"]
mod tests;
