use std::{collections::HashMap, sync::Arc};

use chrono::{Local, NaiveTime, Timelike};
use shared::domain::{Curve, CurveId, CurveKind, Light, DAY_MINUTES, DAY_START_SHIFT_MINUTES};
use spline::MonotoneSpline;
use storage::Storage;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{Controller, ControllerError, Result};

/// Position on the curve day for a wall-clock time. Curve days start at 04:00,
/// so 04:00 maps to 0 and 03:59 to 1439.
pub fn curve_x_at(time: NaiveTime) -> i32 {
    let minutes = (time.num_seconds_from_midnight() / 60) as i32;
    (minutes - DAY_START_SHIFT_MINUTES).rem_euclid(DAY_MINUTES)
}

/// The curve driving `kind` for a light: its own reference when set, the
/// kind's default otherwise.
pub async fn resolve_curve(storage: &Storage, light: &Light, kind: CurveKind) -> Result<Curve> {
    if let Some(curve_id) = light.curve_id(kind) {
        match storage.curve(curve_id).await? {
            Some(curve) if curve.kind == kind => return Ok(curve),
            Some(curve) => warn!(
                light_id = light.id.0,
                curve_id = curve_id.0,
                expected = %kind,
                found = %curve.kind,
                "curves: light references a curve of the wrong kind; using default"
            ),
            None => warn!(
                light_id = light.id.0,
                curve_id = curve_id.0,
                "curves: referenced curve missing; using default"
            ),
        }
    }
    storage
        .default_curve(kind)
        .await?
        .ok_or_else(|| ControllerError::not_found(format!("no default {kind} curve")))
}

/// Interpolants memoized by `(curve id, revision)`. A curve whose revision
/// moved on is rebuilt on the next lookup.
#[derive(Default)]
pub struct SplineCache {
    entries: Mutex<HashMap<CurveId, (i64, Arc<MonotoneSpline>)>>,
}

impl SplineCache {
    pub async fn spline(&self, curve: &Curve) -> Result<Arc<MonotoneSpline>> {
        let mut entries = self.entries.lock().await;
        if let Some((revision, spline)) = entries.get(&curve.id) {
            if *revision == curve.revision {
                return Ok(Arc::clone(spline));
            }
        }

        if curve.points.len() < 2 {
            return Err(ControllerError::MalformedCurve {
                curve_id: curve.id,
                reason: format!("{} point(s), at least two required", curve.points.len()),
            });
        }
        let spline = MonotoneSpline::new(curve.samples()).map_err(|err| {
            ControllerError::MalformedCurve {
                curve_id: curve.id,
                reason: err.to_string(),
            }
        })?;
        let spline = Arc::new(spline);
        entries.insert(curve.id, (curve.revision, Arc::clone(&spline)));
        debug!(curve_id = curve.id.0, revision = curve.revision, "curves: spline built");
        Ok(spline)
    }

    /// Keeps only the entries whose `(id, revision)` is in `live`. Returns the
    /// number of entries dropped.
    pub async fn retain_live(&self, live: &HashMap<CurveId, i64>) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        entries.retain(|curve_id, (revision, _)| live.get(curve_id) == Some(revision));
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Controller {
    pub async fn list_curves(&self, kind: Option<CurveKind>) -> Result<Vec<Curve>> {
        Ok(self.storage.list_curves(kind).await?)
    }

    pub async fn curve(&self, curve_id: CurveId) -> Result<Curve> {
        self.storage
            .curve(curve_id)
            .await?
            .ok_or_else(|| ControllerError::not_found(format!("curve {curve_id} not found")))
    }

    /// Value of a curve (offset included) at `x`, or at the current local
    /// time when `x` is `None`.
    pub async fn evaluate_curve(&self, curve_id: CurveId, x: Option<f64>) -> Result<f64> {
        let x = match x {
            Some(x) if !x.is_finite() => {
                return Err(ControllerError::validation("x must be a finite number"))
            }
            Some(x) => x,
            None => f64::from(curve_x_at(Local::now().time())),
        };
        let curve = self.curve(curve_id).await?;
        self.curve_value(&curve, x).await
    }

    pub(crate) async fn curve_value(&self, curve: &Curve, x: f64) -> Result<f64> {
        Ok(self.cache.spline(curve).await?.evaluate(x))
    }
}

#[cfg(test)]
#[path = "tests/curves_tests.rs"]
mod tests;
