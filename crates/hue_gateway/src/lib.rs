use std::collections::HashMap;

use async_trait::async_trait;
use shared::domain::{FixtureInfo, Group, LightId, LightPatch, ReportedLightState};
use thiserror::Error;

mod hue;
mod retry;

pub use hue::{bridge_base_url, pair_bridge, HueGateway};
pub use retry::RetryPolicy;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Transport failure: refused connection, timeout, DNS.
    #[error("bridge unreachable: {0}")]
    Connectivity(String),
    /// The bridge answered but rejected the request.
    #[error("bridge rejected request (type {kind}): {description}")]
    Bridge { kind: i64, description: String },
    #[error("unexpected bridge response: {0}")]
    Decode(String),
    #[error("invalid bridge url '{0}'")]
    InvalidUrl(String),
    #[error("no bridge configured")]
    NotConfigured,
}

impl GatewayError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, GatewayError::Connectivity(_))
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GatewayError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            GatewayError::Bridge {
                kind: i64::from(status.as_u16()),
                description: err.to_string(),
            }
        } else {
            GatewayError::Connectivity(err.to_string())
        }
    }
}

/// The bridge (or anything that behaves like one) the controller drives.
#[async_trait]
pub trait DeviceGateway: Send + Sync {
    /// Reported state of every light, fetched in one request.
    async fn all_light_states(&self) -> Result<HashMap<LightId, ReportedLightState>, GatewayError>;
    async fn light_state(&self, light_id: LightId) -> Result<ReportedLightState, GatewayError>;
    async fn set_light_state(&self, light_id: LightId, patch: &LightPatch)
        -> Result<(), GatewayError>;
    /// Fixtures currently paired with the bridge.
    async fn inventory(&self) -> Result<Vec<FixtureInfo>, GatewayError>;
    /// Rooms, zones and light groups defined on the bridge.
    async fn groups(&self) -> Result<Vec<Group>, GatewayError>;
}

/// Gateway used until a bridge has been paired.
pub struct UnconfiguredGateway;

#[async_trait]
impl DeviceGateway for UnconfiguredGateway {
    async fn all_light_states(&self) -> Result<HashMap<LightId, ReportedLightState>, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn light_state(&self, _light_id: LightId) -> Result<ReportedLightState, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn set_light_state(
        &self,
        _light_id: LightId,
        _patch: &LightPatch,
    ) -> Result<(), GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn inventory(&self) -> Result<Vec<FixtureInfo>, GatewayError> {
        Err(GatewayError::NotConfigured)
    }

    async fn groups(&self) -> Result<Vec<Group>, GatewayError> {
        Err(GatewayError::NotConfigured)
    }
}
