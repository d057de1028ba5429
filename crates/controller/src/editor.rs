//! Invariant-checked mutations of curves and their control points.
//!
//! Every operation holds the curve's lock, runs in one storage transaction
//! and either commits the whole change (bumping the revision) or nothing.

use serde::{Deserialize, Serialize};
use shared::domain::{Curve, CurveId, CurveKind, InsertSide, Point, DAY_MINUTES};
use spline::MonotoneSpline;
use storage::{CurveEdit, NewCurve};
use tracing::info;

use crate::{Controller, ControllerError, Result};

const DEFAULT_POINT_COUNT: usize = 2;
const DEFAULT_INITIAL_Y: f64 = 200.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCurveRequest {
    pub name: String,
    pub kind: CurveKind,
    #[serde(default)]
    pub offset: f64,
    #[serde(default = "default_point_count")]
    pub count: usize,
    #[serde(default = "default_initial_y")]
    pub y: f64,
}

fn default_point_count() -> usize {
    DEFAULT_POINT_COUNT
}

fn default_initial_y() -> f64 {
    DEFAULT_INITIAL_Y
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CurveUpdate {
    pub name: Option<String>,
    pub offset: Option<f64>,
}

/// `count` integer positions spread evenly over the curve day.
fn even_positions(count: usize) -> Vec<i32> {
    let span = (count - 1) as i64;
    (0..count as i64)
        .map(|i| (i64::from(DAY_MINUTES) * i / span) as i32)
        .collect()
}

fn ensure_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ControllerError::validation(format!("{name} must be a finite number")))
    }
}

fn point_at(curve: &Curve, index: usize) -> Result<&Point> {
    curve.points.get(index).ok_or_else(|| {
        ControllerError::not_found(format!(
            "curve {} has no point at index {index} ({} points)",
            curve.id,
            curve.points.len()
        ))
    })
}

impl Controller {
    async fn open_edit(&self, curve_id: CurveId) -> Result<CurveEdit> {
        self.storage
            .edit_curve(curve_id)
            .await?
            .ok_or_else(|| ControllerError::not_found(format!("curve {curve_id} not found")))
    }

    pub async fn create_curve(&self, request: NewCurveRequest) -> Result<Curve> {
        let name = request.name.trim();
        if name.is_empty() {
            return Err(ControllerError::validation("curve name must not be empty"));
        }
        let max_points = DAY_MINUTES as usize + 1;
        if request.count < 2 || request.count > max_points {
            return Err(ControllerError::validation(format!(
                "a curve needs between 2 and {max_points} points, got {}",
                request.count
            )));
        }
        ensure_finite("y", request.y)?;
        ensure_finite("offset", request.offset)?;

        let points = even_positions(request.count)
            .into_iter()
            .map(|x| (x, request.y))
            .collect();
        let curve_id = self
            .storage
            .create_curve(&NewCurve {
                name: name.to_string(),
                kind: request.kind,
                is_default: false,
                offset: request.offset,
                points,
            })
            .await?;
        info!(curve_id = curve_id.0, kind = %request.kind, count = request.count, "editor: curve created");
        self.curve(curve_id).await
    }

    pub async fn update_curve(&self, curve_id: CurveId, update: CurveUpdate) -> Result<Curve> {
        if let Some(offset) = update.offset {
            ensure_finite("offset", offset)?;
        }
        let name = update.name.as_deref().map(str::trim);
        if name == Some("") {
            return Err(ControllerError::validation("curve name must not be empty"));
        }

        let _guard = self.curve_locks.acquire(curve_id).await;
        let mut edit = self.open_edit(curve_id).await?;
        if let Some(name) = name {
            edit.rename(name).await?;
        }
        if let Some(offset) = update.offset {
            edit.set_offset(offset).await?;
        }
        let curve = edit.commit().await?;
        info!(curve_id = curve_id.0, revision = curve.revision, "editor: curve updated");
        Ok(curve)
    }

    pub async fn set_default_curve(&self, curve_id: CurveId) -> Result<Curve> {
        let _guard = self.curve_locks.acquire(curve_id).await;
        let mut edit = self.open_edit(curve_id).await?;
        if !edit.curve().is_default {
            edit.make_default().await?;
        }
        let curve = edit.commit().await?;
        info!(curve_id = curve_id.0, kind = %curve.kind, "editor: default curve changed");
        Ok(curve)
    }

    /// Default curves cannot be deleted. Lights using the curve fall back to
    /// the default of its kind.
    pub async fn delete_curve(&self, curve_id: CurveId) -> Result<()> {
        {
            let _guard = self.curve_locks.acquire(curve_id).await;
            let edit = self.open_edit(curve_id).await?;
            if edit.curve().is_default {
                return Err(ControllerError::validation(format!(
                    "curve {curve_id} is the default {} curve and cannot be deleted",
                    edit.curve().kind
                )));
            }
            edit.delete().await?;
        }
        self.curve_locks.forget(curve_id).await;
        info!(curve_id = curve_id.0, "editor: curve deleted");
        Ok(())
    }

    /// Inserts a point halfway between the point at `anchor` and its
    /// neighbour on `side`. The new point takes the curve's current value at
    /// that position, so the shape does not change.
    pub async fn insert_point(
        &self,
        curve_id: CurveId,
        anchor: usize,
        side: InsertSide,
    ) -> Result<Curve> {
        let _guard = self.curve_locks.acquire(curve_id).await;
        let mut edit = self.open_edit(curve_id).await?;
        let curve = edit.curve();
        let anchor_point = point_at(curve, anchor)?;

        let (left, right) = match side {
            InsertSide::After => {
                if anchor_point.last || anchor + 1 >= curve.points.len() {
                    return Err(ControllerError::validation(
                        "cannot insert a point after the last point",
                    ));
                }
                (&curve.points[anchor], &curve.points[anchor + 1])
            }
            InsertSide::Before => {
                if anchor_point.first || anchor == 0 {
                    return Err(ControllerError::validation(
                        "cannot insert a point before the first point",
                    ));
                }
                (&curve.points[anchor - 1], &curve.points[anchor])
            }
        };

        let basis = left.x.min(right.x);
        let delta = (left.x - right.x).abs();
        if delta < 2 {
            return Err(ControllerError::validation(format!(
                "no free minute between x = {} and x = {}",
                left.x, right.x
            )));
        }
        let x = basis + delta / 2;

        // offset excluded: it is a transient bias, not part of the shape
        let y = MonotoneSpline::new(curve.base_samples())
            .map_err(|err| ControllerError::MalformedCurve {
                curve_id,
                reason: err.to_string(),
            })?
            .evaluate(f64::from(x));

        edit.insert_point(x, y).await?;
        let curve = edit.commit().await?;
        info!(curve_id = curve_id.0, x, y, "editor: point inserted");
        Ok(curve)
    }

    pub async fn delete_point(&self, curve_id: CurveId, index: usize) -> Result<Curve> {
        let _guard = self.curve_locks.acquire(curve_id).await;
        let mut edit = self.open_edit(curve_id).await?;
        let point = point_at(edit.curve(), index)?;
        if point.is_endpoint() {
            return Err(ControllerError::validation(
                "the first and last points cannot be deleted",
            ));
        }
        let point_id = point.id;

        edit.delete_point(point_id).await?;
        let curve = edit.commit().await?;
        info!(curve_id = curve_id.0, point_id = point_id.0, "editor: point deleted");
        Ok(curve)
    }

    /// Replaces the position and value of the point at `index`. Endpoints
    /// keep their x; only their value may change.
    pub async fn update_point(
        &self,
        curve_id: CurveId,
        index: usize,
        x: i32,
        y: f64,
    ) -> Result<Curve> {
        ensure_finite("y", y)?;
        if !(0..=DAY_MINUTES).contains(&x) {
            return Err(ControllerError::validation(format!(
                "x must lie within [0, {DAY_MINUTES}], got {x}"
            )));
        }

        let _guard = self.curve_locks.acquire(curve_id).await;
        let mut edit = self.open_edit(curve_id).await?;
        let curve = edit.curve();
        let point = point_at(curve, index)?;
        if point.is_endpoint() && x != point.x {
            return Err(ControllerError::validation(format!(
                "the {} point is pinned at x = {}",
                if point.first { "first" } else { "last" },
                point.x
            )));
        }
        if curve
            .points
            .iter()
            .any(|other| other.id != point.id && other.x == x)
        {
            return Err(ControllerError::validation(format!(
                "curve {curve_id} already has a point at x = {x}"
            )));
        }
        let point_id = point.id;

        edit.update_point(point_id, x, y).await?;
        let curve = edit.commit().await?;
        info!(curve_id = curve_id.0, point_id = point_id.0, x, y, "editor: point updated");
        Ok(curve)
    }
}

#[cfg(test)]
#[path = "tests/editor_tests.rs"]
mod tests;
