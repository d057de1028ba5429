use anyhow::{anyhow, ensure, Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite, SqliteConnection, Transaction,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{
    Curve, CurveId, CurveKind, FixtureInfo, Group, GroupId, Light, LightId, Point, PointId,
    Settings, SmartOffBaseline, Status,
};

/// Default brightness curve installed on first start.
pub const DEFAULT_BRI_POINTS: [(i32, f64); 6] = [
    (0, 245.0),
    (360, 216.0),
    (660, 182.0),
    (900, 221.0),
    (1080, 27.0),
    (1440, 12.0),
];

/// Default color temperature curve (mired) installed on first start.
pub const DEFAULT_CT_POINTS: [(i32, f64); 5] = [
    (0, 153.0),
    (420, 324.0),
    (900, 347.0),
    (1080, 475.0),
    (1440, 500.0),
];

const LIGHT_COLUMNS: &str = "id, name, light_type, model_id, is_on, on_controlled, on_threshold, \
     bri_controlled, bri_max, ct_controlled, bri_curve_id, ct_curve_id, \
     smart_off_on, smart_off_bri, smart_off_ct, smart_off_active";

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct NewCurve {
    pub name: String,
    pub kind: CurveKind,
    pub is_default: bool,
    pub offset: f64,
    /// `(x, y)` in ascending `x`; the first and last become the endpoints.
    pub points: Vec<(i32, f64)>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let mut connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        // every connection to an in-memory database is a separate database
        let pool_options = if is_in_memory(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new().max_connections(5)
        };
        let pool = pool_options.connect_with(connect_options).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        let storage = Self { pool };
        storage.seed_defaults().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn seed_defaults(&self) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO status (id, enabled) VALUES (0, 0)")
            .execute(&self.pool)
            .await
            .context("failed to seed status")?;
        sqlx::query("INSERT OR IGNORE INTO settings (id, smart_off) VALUES (0, 1)")
            .execute(&self.pool)
            .await
            .context("failed to seed settings")?;

        for kind in CurveKind::ALL {
            if self.default_curve(kind).await?.is_some() {
                continue;
            }
            let points = match kind {
                CurveKind::Bri => DEFAULT_BRI_POINTS.to_vec(),
                CurveKind::Ct => DEFAULT_CT_POINTS.to_vec(),
            };
            self.create_curve(&NewCurve {
                name: "Default".into(),
                kind,
                is_default: true,
                offset: 0.0,
                points,
            })
            .await
            .with_context(|| format!("failed to seed default {kind} curve"))?;
        }
        Ok(())
    }

    pub async fn status(&self) -> Result<Status> {
        let enabled: bool = sqlx::query_scalar("SELECT enabled FROM status WHERE id = 0")
            .fetch_one(&self.pool)
            .await
            .context("status row missing")?;
        Ok(Status { enabled })
    }

    pub async fn set_status(&self, status: Status) -> Result<()> {
        sqlx::query("UPDATE status SET enabled = ? WHERE id = 0")
            .bind(status.enabled)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn settings(&self) -> Result<Settings> {
        let smart_off: bool = sqlx::query_scalar("SELECT smart_off FROM settings WHERE id = 0")
            .fetch_one(&self.pool)
            .await
            .context("settings row missing")?;
        Ok(Settings { smart_off })
    }

    pub async fn set_settings(&self, settings: Settings) -> Result<()> {
        sqlx::query("UPDATE settings SET smart_off = ? WHERE id = 0")
            .bind(settings.smart_off)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_curves(&self, kind: Option<CurveKind>) -> Result<Vec<Curve>> {
        let mut conn = self.pool.acquire().await?;
        let rows = match kind {
            Some(kind) => {
                sqlx::query(
                    "SELECT id, name, kind, is_default, offset_value, revision
                     FROM curves WHERE kind = ? ORDER BY id",
                )
                .bind(kind.as_str())
                .fetch_all(&mut *conn)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT id, name, kind, is_default, offset_value, revision
                     FROM curves ORDER BY id",
                )
                .fetch_all(&mut *conn)
                .await?
            }
        };

        let mut curves = Vec::with_capacity(rows.len());
        for row in rows {
            let mut curve = curve_from_row(&row)?;
            curve.points = fetch_points(&mut conn, curve.id).await?;
            curves.push(curve);
        }
        Ok(curves)
    }

    pub async fn curve(&self, curve_id: CurveId) -> Result<Option<Curve>> {
        let mut conn = self.pool.acquire().await?;
        fetch_curve(&mut conn, curve_id).await
    }

    pub async fn default_curve(&self, kind: CurveKind) -> Result<Option<Curve>> {
        let mut conn = self.pool.acquire().await?;
        let curve_id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM curves WHERE kind = ? AND is_default = 1")
                .bind(kind.as_str())
                .fetch_optional(&mut *conn)
                .await?;
        match curve_id {
            Some(curve_id) => fetch_curve(&mut conn, CurveId(curve_id)).await,
            None => Ok(None),
        }
    }

    pub async fn create_curve(&self, new_curve: &NewCurve) -> Result<CurveId> {
        ensure!(
            new_curve.points.len() >= 2,
            "a curve needs at least two points"
        );
        let mut tx = self.pool.begin().await?;
        let rec = sqlx::query(
            "INSERT INTO curves (name, kind, is_default, offset_value) VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(&new_curve.name)
        .bind(new_curve.kind.as_str())
        .bind(new_curve.is_default)
        .bind(new_curve.offset)
        .fetch_one(&mut *tx)
        .await?;
        let curve_id = CurveId(rec.get::<i64, _>(0));

        let last = new_curve.points.len() - 1;
        for (index, (x, y)) in new_curve.points.iter().enumerate() {
            sqlx::query(
                "INSERT INTO points (curve_id, x, y, is_first, is_last) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(curve_id.0)
            .bind(x)
            .bind(y)
            .bind(index == 0)
            .bind(index == last)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(curve_id)
    }

    /// Opens a transaction scoped to one curve. Nothing is visible to other
    /// readers until [`CurveEdit::commit`].
    ///
    /// The write lock is taken up front so the edit never has to upgrade a
    /// read lock while another connection is writing. Concurrent writers
    /// wait on the busy timeout instead of failing with `database is locked`.
    pub async fn edit_curve(&self, curve_id: CurveId) -> Result<Option<CurveEdit>> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE curves SET revision = revision WHERE id = ?")
            .bind(curve_id.0)
            .execute(&mut *tx)
            .await
            .context("failed to lock curve for editing")?;
        let Some(curve) = fetch_curve(&mut tx, curve_id).await? else {
            return Ok(None);
        };
        Ok(Some(CurveEdit { tx, curve }))
    }

    /// Zeroes every non-zero curve offset, returning how many curves changed.
    pub async fn reset_offsets(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE curves SET offset_value = 0, revision = revision + 1 WHERE offset_value != 0",
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_lights(&self) -> Result<Vec<Light>> {
        let rows = sqlx::query(&format!("SELECT {LIGHT_COLUMNS} FROM lights ORDER BY id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(light_from_row).collect()
    }

    pub async fn light(&self, light_id: LightId) -> Result<Option<Light>> {
        let row = sqlx::query(&format!("SELECT {LIGHT_COLUMNS} FROM lights WHERE id = ?"))
            .bind(light_id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(light_from_row).transpose()
    }

    /// Inserts or refreshes the descriptive fields of a fixture. Returns
    /// `true` when the light was not known before.
    pub async fn upsert_fixture(&self, fixture: &FixtureInfo) -> Result<bool> {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM lights WHERE id = ?")
            .bind(fixture.id.0)
            .fetch_optional(&self.pool)
            .await?;
        sqlx::query(
            "INSERT INTO lights (id, name, light_type, model_id) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                light_type = excluded.light_type,
                model_id = excluded.model_id",
        )
        .bind(fixture.id.0)
        .bind(&fixture.name)
        .bind(&fixture.light_type)
        .bind(&fixture.model_id)
        .execute(&self.pool)
        .await?;
        Ok(existing.is_none())
    }

    /// Deletes every light whose id is not in `keep`.
    pub async fn remove_lights_except(&self, keep: &[LightId]) -> Result<u64> {
        let known: Vec<i64> = sqlx::query_scalar("SELECT id FROM lights")
            .fetch_all(&self.pool)
            .await?;
        let mut removed = 0;
        for light_id in known {
            if keep.iter().any(|kept| kept.0 == light_id) {
                continue;
            }
            removed += sqlx::query("DELETE FROM lights WHERE id = ?")
                .bind(light_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        Ok(removed)
    }

    /// Persists the user-editable configuration of a light.
    pub async fn save_light_config(&self, light: &Light) -> Result<()> {
        let result = sqlx::query(
            "UPDATE lights SET
                is_on = ?, on_controlled = ?, on_threshold = ?, bri_controlled = ?,
                bri_max = ?, ct_controlled = ?, bri_curve_id = ?, ct_curve_id = ?
             WHERE id = ?",
        )
        .bind(light.on)
        .bind(light.on_controlled)
        .bind(light.on_threshold)
        .bind(light.bri_controlled)
        .bind(light.bri_max)
        .bind(light.ct_controlled)
        .bind(light.bri_curve_id.map(|id| id.0))
        .bind(light.ct_curve_id.map(|id| id.0))
        .bind(light.id.0)
        .execute(&self.pool)
        .await?;
        ensure!(result.rows_affected() == 1, "light {} not found", light.id);
        Ok(())
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        let mut conn = self.pool.acquire().await?;
        let ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM groups ORDER BY id")
            .fetch_all(&mut *conn)
            .await?;
        let mut groups = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(group) = fetch_group(&mut conn, GroupId(id)).await? {
                groups.push(group);
            }
        }
        Ok(groups)
    }

    pub async fn group(&self, group_id: GroupId) -> Result<Option<Group>> {
        let mut conn = self.pool.acquire().await?;
        fetch_group(&mut conn, group_id).await
    }

    /// Inserts or refreshes a group and replaces its membership. Members that
    /// are not stored lights are skipped. Returns `true` for a new group.
    pub async fn upsert_group(&self, group: &Group) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM groups WHERE id = ?")
            .bind(group.id.0)
            .fetch_optional(&mut *tx)
            .await?;
        sqlx::query(
            "INSERT INTO groups (id, name, group_type) VALUES (?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                group_type = excluded.group_type",
        )
        .bind(group.id.0)
        .bind(&group.name)
        .bind(&group.group_type)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM group_lights WHERE group_id = ?")
            .bind(group.id.0)
            .execute(&mut *tx)
            .await?;
        for light_id in &group.lights {
            sqlx::query(
                "INSERT OR IGNORE INTO group_lights (group_id, light_id)
                 SELECT ?, id FROM lights WHERE id = ?",
            )
            .bind(group.id.0)
            .bind(light_id.0)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(existing.is_none())
    }

    /// Deletes every group whose id is not in `keep`.
    pub async fn remove_groups_except(&self, keep: &[GroupId]) -> Result<u64> {
        let known: Vec<i64> = sqlx::query_scalar("SELECT id FROM groups")
            .fetch_all(&self.pool)
            .await?;
        let mut removed = 0;
        for group_id in known {
            if keep.iter().any(|kept| kept.0 == group_id) {
                continue;
            }
            removed += sqlx::query("DELETE FROM groups WHERE id = ?")
                .bind(group_id)
                .execute(&self.pool)
                .await?
                .rows_affected();
        }
        Ok(removed)
    }

    pub async fn save_smart_off(
        &self,
        light_id: LightId,
        baseline: &SmartOffBaseline,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE lights SET
                smart_off_on = ?, smart_off_bri = ?, smart_off_ct = ?, smart_off_active = ?
             WHERE id = ?",
        )
        .bind(baseline.on)
        .bind(baseline.bri.map(i64::from))
        .bind(baseline.ct.map(i64::from))
        .bind(baseline.active)
        .bind(light_id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// A curve loaded inside an open transaction.
pub struct CurveEdit {
    tx: Transaction<'static, Sqlite>,
    curve: Curve,
}

impl CurveEdit {
    /// The curve as it was when the edit was opened.
    pub fn curve(&self) -> &Curve {
        &self.curve
    }

    pub async fn insert_point(&mut self, x: i32, y: f64) -> Result<PointId> {
        let rec = sqlx::query(
            "INSERT INTO points (curve_id, x, y, is_first, is_last) VALUES (?, ?, ?, 0, 0)
             RETURNING id",
        )
        .bind(self.curve.id.0)
        .bind(x)
        .bind(y)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(PointId(rec.get::<i64, _>(0)))
    }

    pub async fn delete_point(&mut self, point_id: PointId) -> Result<()> {
        let result = sqlx::query("DELETE FROM points WHERE id = ? AND curve_id = ?")
            .bind(point_id.0)
            .bind(self.curve.id.0)
            .execute(&mut *self.tx)
            .await?;
        ensure!(result.rows_affected() == 1, "point {point_id} not found");
        Ok(())
    }

    pub async fn update_point(&mut self, point_id: PointId, x: i32, y: f64) -> Result<()> {
        let result = sqlx::query("UPDATE points SET x = ?, y = ? WHERE id = ? AND curve_id = ?")
            .bind(x)
            .bind(y)
            .bind(point_id.0)
            .bind(self.curve.id.0)
            .execute(&mut *self.tx)
            .await?;
        ensure!(result.rows_affected() == 1, "point {point_id} not found");
        Ok(())
    }

    pub async fn rename(&mut self, name: &str) -> Result<()> {
        sqlx::query("UPDATE curves SET name = ? WHERE id = ?")
            .bind(name)
            .bind(self.curve.id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    pub async fn set_offset(&mut self, offset: f64) -> Result<()> {
        sqlx::query("UPDATE curves SET offset_value = ? WHERE id = ?")
            .bind(offset)
            .bind(self.curve.id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Makes this curve the default of its kind, demoting the previous one.
    pub async fn make_default(&mut self) -> Result<()> {
        sqlx::query(
            "UPDATE curves SET is_default = 0, revision = revision + 1
             WHERE kind = ? AND is_default = 1 AND id != ?",
        )
        .bind(self.curve.kind.as_str())
        .bind(self.curve.id.0)
        .execute(&mut *self.tx)
        .await?;
        sqlx::query("UPDATE curves SET is_default = 1 WHERE id = ?")
            .bind(self.curve.id.0)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    /// Removes the curve and its points; lights using it lose the reference.
    pub async fn delete(mut self) -> Result<()> {
        let curve_id = self.curve.id.0;
        sqlx::query("UPDATE lights SET bri_curve_id = NULL WHERE bri_curve_id = ?")
            .bind(curve_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("UPDATE lights SET ct_curve_id = NULL WHERE ct_curve_id = ?")
            .bind(curve_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM points WHERE curve_id = ?")
            .bind(curve_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("DELETE FROM curves WHERE id = ?")
            .bind(curve_id)
            .execute(&mut *self.tx)
            .await?;
        self.tx.commit().await?;
        Ok(())
    }

    /// Bumps the curve revision and commits, returning the stored curve.
    pub async fn commit(mut self) -> Result<Curve> {
        let curve_id = self.curve.id;
        sqlx::query("UPDATE curves SET revision = revision + 1 WHERE id = ?")
            .bind(curve_id.0)
            .execute(&mut *self.tx)
            .await?;
        let curve = fetch_curve(&mut self.tx, curve_id)
            .await?
            .ok_or_else(|| anyhow!("curve {curve_id} vanished during edit"))?;
        self.tx.commit().await?;
        Ok(curve)
    }
}

async fn fetch_curve(conn: &mut SqliteConnection, curve_id: CurveId) -> Result<Option<Curve>> {
    let row = sqlx::query(
        "SELECT id, name, kind, is_default, offset_value, revision FROM curves WHERE id = ?",
    )
    .bind(curve_id.0)
    .fetch_optional(&mut *conn)
    .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut curve = curve_from_row(&row)?;
    curve.points = fetch_points(conn, curve_id).await?;
    Ok(Some(curve))
}

async fn fetch_group(conn: &mut SqliteConnection, group_id: GroupId) -> Result<Option<Group>> {
    let row = sqlx::query("SELECT id, name, group_type FROM groups WHERE id = ?")
        .bind(group_id.0)
        .fetch_optional(&mut *conn)
        .await?;
    let Some(row) = row else {
        return Ok(None);
    };
    let lights: Vec<i64> = sqlx::query_scalar(
        "SELECT light_id FROM group_lights WHERE group_id = ? ORDER BY light_id",
    )
    .bind(group_id.0)
    .fetch_all(&mut *conn)
    .await?;
    Ok(Some(Group {
        id: GroupId(row.try_get("id")?),
        name: row.try_get("name")?,
        group_type: row.try_get("group_type")?,
        lights: lights.into_iter().map(LightId).collect(),
    }))
}

async fn fetch_points(conn: &mut SqliteConnection, curve_id: CurveId) -> Result<Vec<Point>> {
    let rows = sqlx::query(
        "SELECT id, x, y, is_first, is_last FROM points WHERE curve_id = ? ORDER BY x, id",
    )
    .bind(curve_id.0)
    .fetch_all(&mut *conn)
    .await?;
    rows.iter()
        .map(|row| {
            Ok(Point {
                id: PointId(row.try_get("id")?),
                x: row.try_get("x")?,
                y: row.try_get("y")?,
                first: row.try_get("is_first")?,
                last: row.try_get("is_last")?,
            })
        })
        .collect()
}

fn curve_from_row(row: &SqliteRow) -> Result<Curve> {
    let kind: String = row.try_get("kind")?;
    Ok(Curve {
        id: CurveId(row.try_get("id")?),
        name: row.try_get("name")?,
        kind: kind.parse::<CurveKind>().map_err(anyhow::Error::msg)?,
        is_default: row.try_get("is_default")?,
        offset: row.try_get("offset_value")?,
        revision: row.try_get("revision")?,
        points: Vec::new(),
    })
}

fn light_from_row(row: &SqliteRow) -> Result<Light> {
    let smart_off_bri: Option<i64> = row.try_get("smart_off_bri")?;
    let smart_off_ct: Option<i64> = row.try_get("smart_off_ct")?;
    Ok(Light {
        id: LightId(row.try_get("id")?),
        name: row.try_get("name")?,
        light_type: row.try_get("light_type")?,
        model_id: row.try_get("model_id")?,
        on: row.try_get("is_on")?,
        on_controlled: row.try_get("on_controlled")?,
        on_threshold: row.try_get("on_threshold")?,
        bri_controlled: row.try_get("bri_controlled")?,
        bri_max: row.try_get("bri_max")?,
        ct_controlled: row.try_get("ct_controlled")?,
        bri_curve_id: row.try_get::<Option<i64>, _>("bri_curve_id")?.map(CurveId),
        ct_curve_id: row.try_get::<Option<i64>, _>("ct_curve_id")?.map(CurveId),
        smart_off: SmartOffBaseline {
            on: row.try_get("smart_off_on")?,
            bri: smart_off_bri.and_then(|v| u8::try_from(v).ok()),
            ct: smart_off_ct.and_then(|v| u16::try_from(v).ok()),
            active: row.try_get("smart_off_active")?,
        },
    })
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_in_memory(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
