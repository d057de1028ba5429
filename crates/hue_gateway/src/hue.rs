use std::{collections::HashMap, time::Duration};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use shared::domain::{FixtureInfo, Group, GroupId, LightId, LightPatch, ReportedLightState};
use tracing::{debug, info};
use url::Url;

use crate::{DeviceGateway, GatewayError, RetryPolicy};

/// Hue error type returned while the link button has not been pressed.
const LINK_BUTTON_NOT_PRESSED: i64 = 101;

#[derive(Debug, Deserialize)]
struct HueLight {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    light_type: String,
    #[serde(default)]
    modelid: String,
    state: HueState,
}

#[derive(Debug, Deserialize)]
struct HueState {
    on: bool,
    bri: Option<u8>,
    ct: Option<u16>,
    #[serde(default = "reachable_by_default")]
    reachable: bool,
}

fn reachable_by_default() -> bool {
    true
}

impl From<&HueState> for ReportedLightState {
    fn from(state: &HueState) -> Self {
        Self {
            on: state.on,
            bri: state.bri,
            ct: state.ct,
            reachable: state.reachable,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HueGroup {
    #[serde(default)]
    name: String,
    #[serde(rename = "type", default)]
    group_type: String,
    #[serde(default)]
    lights: Vec<String>,
}

fn parse_id(kind: &str, raw: &str) -> Result<i64, GatewayError> {
    raw.parse::<i64>()
        .map_err(|_| GatewayError::Decode(format!("non-numeric {kind} id '{raw}'")))
}

#[derive(Debug, Deserialize)]
struct HueFailure {
    #[serde(rename = "type")]
    kind: i64,
    #[serde(default)]
    description: String,
}

/// Hue v1 REST client bound to one bridge user.
#[derive(Debug, Clone)]
pub struct HueGateway {
    http: Client,
    api: Url,
}

impl HueGateway {
    pub fn new(bridge_url: &str, username: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let api = bridge_base_url(bridge_url)?
            .join(&format!("api/{username}/"))
            .map_err(|_| GatewayError::InvalidUrl(bridge_url.to_string()))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(GatewayError::from)?;
        Ok(Self { http, api })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        self.api
            .join(path)
            .map_err(|_| GatewayError::InvalidUrl(format!("{}{path}", self.api)))
    }

    async fn get_json(&self, path: &str) -> Result<Value, GatewayError> {
        let body: Value = self
            .http
            .get(self.endpoint(path)?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        // the bridge reports failures as a JSON array even on GET
        if body.is_array() {
            check_results(&body)?;
            return Err(GatewayError::Decode(format!("expected object from {path}")));
        }
        Ok(body)
    }

    async fn lights(&self) -> Result<HashMap<LightId, HueLight>, GatewayError> {
        let body = self.get_json("lights").await?;
        let raw: HashMap<String, HueLight> =
            serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        raw.into_iter()
            .map(|(id, light)| Ok((LightId(parse_id("light", &id)?), light)))
            .collect()
    }
}

#[async_trait]
impl DeviceGateway for HueGateway {
    async fn all_light_states(&self) -> Result<HashMap<LightId, ReportedLightState>, GatewayError> {
        Ok(self
            .lights()
            .await?
            .iter()
            .map(|(id, light)| (*id, ReportedLightState::from(&light.state)))
            .collect())
    }

    async fn light_state(&self, light_id: LightId) -> Result<ReportedLightState, GatewayError> {
        let body = self.get_json(&format!("lights/{light_id}")).await?;
        let light: HueLight =
            serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        Ok(ReportedLightState::from(&light.state))
    }

    async fn set_light_state(
        &self,
        light_id: LightId,
        patch: &LightPatch,
    ) -> Result<(), GatewayError> {
        let body: Value = self
            .http
            .put(self.endpoint(&format!("lights/{light_id}/state"))?)
            .json(patch)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        check_results(&body)?;
        debug!(light_id = light_id.0, response = %body, "hue: state applied");
        Ok(())
    }

    async fn inventory(&self) -> Result<Vec<FixtureInfo>, GatewayError> {
        let mut fixtures: Vec<FixtureInfo> = self
            .lights()
            .await?
            .into_iter()
            .map(|(id, light)| FixtureInfo {
                id,
                name: light.name,
                light_type: light.light_type,
                model_id: light.modelid,
            })
            .collect();
        fixtures.sort_by_key(|fixture| fixture.id);
        Ok(fixtures)
    }

    async fn groups(&self) -> Result<Vec<Group>, GatewayError> {
        let body = self.get_json("groups").await?;
        let raw: HashMap<String, HueGroup> =
            serde_json::from_value(body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        let mut groups = raw
            .into_iter()
            .map(|(id, group)| {
                let mut lights = group
                    .lights
                    .iter()
                    .map(|light| parse_id("light", light).map(LightId))
                    .collect::<Result<Vec<_>, _>>()?;
                lights.sort();
                Ok(Group {
                    id: GroupId(parse_id("group", &id)?),
                    name: group.name,
                    group_type: group.group_type,
                    lights,
                })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;
        groups.sort_by_key(|group| group.id);
        Ok(groups)
    }
}

/// Accepts `http://host`, `https://host` or a bare host / IP address.
pub fn bridge_base_url(raw: &str) -> Result<Url, GatewayError> {
    let raw = raw.trim().trim_end_matches('/');
    let with_scheme = if raw.contains("://") {
        format!("{raw}/")
    } else {
        format!("http://{raw}/")
    };
    let url = Url::parse(&with_scheme).map_err(|_| GatewayError::InvalidUrl(raw.to_string()))?;
    if url.host_str().is_none() {
        return Err(GatewayError::InvalidUrl(raw.to_string()));
    }
    Ok(url)
}

/// Registers a new bridge user. The bridge only accepts the request within
/// 30 seconds of its link button being pressed, so the request is retried
/// while the bridge keeps answering "link button not pressed".
pub async fn pair_bridge(
    bridge_url: &str,
    device_type: &str,
    policy: RetryPolicy,
) -> Result<String, GatewayError> {
    let endpoint = bridge_base_url(bridge_url)?
        .join("api")
        .map_err(|_| GatewayError::InvalidUrl(bridge_url.to_string()))?;
    let http = Client::new();
    let request = serde_json::json!({ "devicetype": device_type });

    let username = policy
        .run(
            "hue pairing",
            |err: &GatewayError| {
                matches!(err, GatewayError::Bridge { kind, .. } if *kind == LINK_BUTTON_NOT_PRESSED)
            },
            || {
                let http = http.clone();
                let endpoint = endpoint.clone();
                let request = request.clone();
                async move {
                    let body: Value = http
                        .post(endpoint)
                        .json(&request)
                        .send()
                        .await?
                        .error_for_status()?
                        .json()
                        .await?;
                    check_results(&body)?;
                    body.pointer("/0/success/username")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .ok_or_else(|| GatewayError::Decode(format!("no username in {body}")))
                }
            },
        )
        .await?;
    info!(%endpoint, "hue: bridge paired");
    Ok(username)
}

/// Hue answers writes with `[{"success": ..}, {"error": ..}]`.
fn check_results(body: &Value) -> Result<(), GatewayError> {
    let Some(entries) = body.as_array() else {
        return Ok(());
    };
    for entry in entries {
        if let Some(error) = entry.get("error") {
            let failure: HueFailure = serde_json::from_value(error.clone())
                .map_err(|e| GatewayError::Decode(e.to_string()))?;
            return Err(GatewayError::Bridge {
                kind: failure.kind,
                description: failure.description,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/hue_tests.rs"]
mod tests;
