use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveTime;
use hue_gateway::{DeviceGateway, GatewayError};
use shared::domain::{FixtureInfo, Group, GroupId, Light, LightId, LightPatch, ReportedLightState};
use storage::Storage;
use tokio::sync::Mutex;

use crate::{Controller, Notifier, NotifyEvent};

/// In-memory bridge that records every write. Writes are applied to the
/// reported state unless the light is listed in `rejecting`.
#[derive(Default)]
pub struct FakeGateway {
    states: Mutex<HashMap<LightId, ReportedLightState>>,
    fixtures: Mutex<Vec<FixtureInfo>>,
    groups: Mutex<Vec<Group>>,
    sent: Mutex<Vec<(LightId, LightPatch)>>,
    rejecting: Mutex<Vec<LightId>>,
    offline: Mutex<bool>,
}

impl FakeGateway {
    pub async fn set_state(&self, light_id: LightId, state: ReportedLightState) {
        self.states.lock().await.insert(light_id, state);
    }

    pub async fn state(&self, light_id: LightId) -> Option<ReportedLightState> {
        self.states.lock().await.get(&light_id).copied()
    }

    pub async fn set_fixtures(&self, fixtures: Vec<FixtureInfo>) {
        *self.fixtures.lock().await = fixtures;
    }

    pub async fn set_groups(&self, groups: Vec<Group>) {
        *self.groups.lock().await = groups;
    }

    pub async fn reject_writes_for(&self, light_id: LightId) {
        self.rejecting.lock().await.push(light_id);
    }

    pub async fn set_offline(&self, offline: bool) {
        *self.offline.lock().await = offline;
    }

    pub async fn sent(&self) -> Vec<(LightId, LightPatch)> {
        self.sent.lock().await.clone()
    }

    pub async fn take_sent(&self) -> Vec<(LightId, LightPatch)> {
        std::mem::take(&mut *self.sent.lock().await)
    }

    async fn ensure_online(&self) -> Result<(), GatewayError> {
        if *self.offline.lock().await {
            return Err(GatewayError::Connectivity("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl DeviceGateway for FakeGateway {
    async fn all_light_states(&self) -> Result<HashMap<LightId, ReportedLightState>, GatewayError> {
        self.ensure_online().await?;
        Ok(self.states.lock().await.clone())
    }

    async fn light_state(&self, light_id: LightId) -> Result<ReportedLightState, GatewayError> {
        self.ensure_online().await?;
        self.state(light_id).await.ok_or(GatewayError::Bridge {
            kind: 3,
            description: format!("resource, /lights/{light_id}, not available"),
        })
    }

    async fn set_light_state(
        &self,
        light_id: LightId,
        patch: &LightPatch,
    ) -> Result<(), GatewayError> {
        self.ensure_online().await?;
        self.sent.lock().await.push((light_id, *patch));
        if self.rejecting.lock().await.contains(&light_id) {
            return Err(GatewayError::Bridge {
                kind: 201,
                description: "parameter is not modifiable".into(),
            });
        }
        if let Some(state) = self.states.lock().await.get_mut(&light_id) {
            *state = state.overlay(patch);
        }
        Ok(())
    }

    async fn inventory(&self) -> Result<Vec<FixtureInfo>, GatewayError> {
        self.ensure_online().await?;
        Ok(self.fixtures.lock().await.clone())
    }

    async fn groups(&self) -> Result<Vec<Group>, GatewayError> {
        self.ensure_online().await?;
        Ok(self.groups.lock().await.clone())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<NotifyEvent>>,
}

impl RecordingNotifier {
    pub async fn events(&self) -> Vec<NotifyEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, event: NotifyEvent) {
        self.events.lock().await.push(event);
    }
}

pub struct Harness {
    pub controller: Controller,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

pub async fn harness() -> Harness {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    let gateway = Arc::new(FakeGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let controller = Controller::new(storage, gateway.clone()).with_notifier(notifier.clone());
    Harness {
        controller,
        gateway,
        notifier,
    }
}

pub fn fixture(id: i64, name: &str) -> FixtureInfo {
    FixtureInfo {
        id: LightId(id),
        name: name.into(),
        light_type: "Extended color light".into(),
        model_id: "LCT015".into(),
    }
}

pub fn group(id: i64, name: &str, lights: &[i64]) -> Group {
    Group {
        id: GroupId(id),
        name: name.into(),
        group_type: "Room".into(),
        lights: lights.iter().copied().map(LightId).collect(),
    }
}

pub fn reported(on: bool, bri: u8, ct: u16) -> ReportedLightState {
    ReportedLightState {
        on,
        bri: Some(bri),
        ct: Some(ct),
        reachable: true,
    }
}

/// Stores a light configured by `configure`.
pub async fn add_light(controller: &Controller, id: i64, configure: impl FnOnce(&mut Light)) -> Light {
    let storage = controller.storage();
    storage
        .upsert_fixture(&fixture(id, &format!("lamp {id}")))
        .await
        .expect("light");
    let mut light = storage
        .light(LightId(id))
        .await
        .expect("query")
        .expect("stored");
    configure(&mut light);
    storage.save_light_config(&light).await.expect("config");
    storage.save_smart_off(light.id, &light.smart_off).await.expect("baseline");
    light
}

pub fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).expect("time")
}
