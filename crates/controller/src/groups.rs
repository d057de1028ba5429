use shared::domain::{Group, GroupId, LightUpdate};
use tracing::info;

use crate::{notify::NotifyEvent, Controller, ControllerError, Result};

impl Controller {
    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        Ok(self.storage.list_groups().await?)
    }

    pub async fn group(&self, group_id: GroupId) -> Result<Group> {
        self.storage
            .group(group_id)
            .await?
            .ok_or_else(|| ControllerError::not_found(format!("group {group_id} not found")))
    }

    /// Applies `update` to every member light. The update is validated once,
    /// so a rejected update leaves all members untouched. A group counts as
    /// on when all of its lights are on; a change of that fires the notifier.
    pub async fn update_group(&self, group_id: GroupId, update: LightUpdate) -> Result<Group> {
        let group = self.group(group_id).await?;
        self.validate_light_update(&update).await?;

        let mut was_on = true;
        let mut is_on = true;
        for light_id in &group.lights {
            was_on &= self.light(*light_id).await?.on;
            is_on &= self.apply_light_update(*light_id, &update).await?.on;
        }
        info!(group_id = group_id.0, lights = group.lights.len(), "groups: group updated");

        if is_on != was_on {
            self.notifier
                .notify(NotifyEvent::group_switched(&group, is_on))
                .await;
        }
        Ok(group)
    }
}

#[cfg(test)]
#[path = "tests/groups_tests.rs"]
mod tests;
