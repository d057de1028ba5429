use std::{collections::HashMap, sync::Arc};

use hue_gateway::{DeviceGateway, GatewayError};
use shared::{
    domain::CurveId,
    error::{ApiError, ErrorCode},
};
use storage::Storage;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub mod curves;
pub mod editor;
pub mod groups;
pub mod inventory;
pub mod maintenance;
pub mod notify;
pub mod reconcile;
pub mod smart_off;

pub use curves::{curve_x_at, resolve_curve, SplineCache};
pub use editor::{CurveUpdate, NewCurveRequest};
pub use inventory::SyncReport;
pub use maintenance::MaintenanceReport;
pub use notify::{NoopNotifier, Notifier, NotifyEvent, WebhookConfig, WebhookMethod, WebhookNotifier};
pub use reconcile::TickReport;

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    NotFound(String),
    #[error("curve {curve_id} cannot be evaluated: {reason}")]
    MalformedCurve { curve_id: CurveId, reason: String },
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl ControllerError {
    pub fn validation(message: impl Into<String>) -> Self {
        ControllerError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ControllerError::NotFound(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ControllerError::Validation(_) => ErrorCode::Validation,
            ControllerError::NotFound(_) => ErrorCode::NotFound,
            ControllerError::Gateway(_) => ErrorCode::Upstream,
            ControllerError::MalformedCurve { .. } | ControllerError::Storage(_) => {
                ErrorCode::Internal
            }
        }
    }
}

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        // storage errors carry the whole anyhow chain
        let message = match &err {
            ControllerError::Storage(inner) => format!("{inner:#}"),
            other => other.to_string(),
        };
        ApiError::new(err.code(), message)
    }
}

pub type Result<T, E = ControllerError> = std::result::Result<T, E>;

/// One writer per curve.
#[derive(Default)]
struct CurveLocks {
    locks: Mutex<HashMap<CurveId, Arc<Mutex<()>>>>,
}

impl CurveLocks {
    async fn acquire(&self, curve_id: CurveId) -> OwnedMutexGuard<()> {
        let lock = self.locks.lock().await.entry(curve_id).or_default().clone();
        lock.lock_owned().await
    }

    async fn forget(&self, curve_id: CurveId) {
        self.locks.lock().await.remove(&curve_id);
    }
}

/// Entry point for everything that reads or changes curves and lights.
#[derive(Clone)]
pub struct Controller {
    storage: Storage,
    gateway: Arc<dyn DeviceGateway>,
    notifier: Arc<dyn Notifier>,
    cache: Arc<SplineCache>,
    curve_locks: Arc<CurveLocks>,
}

impl Controller {
    pub fn new(storage: Storage, gateway: Arc<dyn DeviceGateway>) -> Self {
        Self {
            storage,
            gateway,
            notifier: Arc::new(NoopNotifier),
            cache: Arc::new(SplineCache::default()),
            curve_locks: Arc::new(CurveLocks::default()),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn gateway(&self) -> &Arc<dyn DeviceGateway> {
        &self.gateway
    }

    pub fn cache(&self) -> &SplineCache {
        &self.cache
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
