use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(CurveId);
id_newtype!(PointId);
id_newtype!(LightId);
id_newtype!(GroupId);

/// Minutes in a curve day. Every curve spans `[0, DAY_MINUTES]`.
pub const DAY_MINUTES: i32 = 1440;
/// Curve days start at 04:00 local time.
pub const DAY_START_SHIFT_MINUTES: i32 = 240;
/// Brightness scale of the bridge; `bri_max` is expressed against it.
pub const BRI_SCALE: f64 = 254.0;

const BRI_RANGE: (u8, u8) = (1, 254);
const CT_RANGE: (u16, u16) = (153, 500);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    Bri,
    Ct,
}

impl CurveKind {
    pub const ALL: [CurveKind; 2] = [CurveKind::Bri, CurveKind::Ct];

    pub fn as_str(self) -> &'static str {
        match self {
            CurveKind::Bri => "bri",
            CurveKind::Ct => "ct",
        }
    }
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurveKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "bri" => Ok(CurveKind::Bri),
            "ct" => Ok(CurveKind::Ct),
            other => Err(format!("unknown curve kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertSide {
    Before,
    After,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub x: i32,
    pub y: f64,
    pub first: bool,
    pub last: bool,
}

impl Point {
    pub fn is_endpoint(&self) -> bool {
        self.first || self.last
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Curve {
    pub id: CurveId,
    pub name: String,
    pub kind: CurveKind,
    #[serde(rename = "default")]
    pub is_default: bool,
    pub offset: f64,
    /// Bumped by every mutation of the curve or its points.
    pub revision: i64,
    /// Sorted by `x`.
    pub points: Vec<Point>,
}

impl Curve {
    /// `(x, y + offset)` pairs in point order.
    pub fn samples(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|point| (f64::from(point.x), point.y + self.offset))
            .collect()
    }

    /// `(x, y)` pairs ignoring the transient offset.
    pub fn base_samples(&self) -> Vec<(f64, f64)> {
        self.points
            .iter()
            .map(|point| (f64::from(point.x), point.y))
            .collect()
    }
}

/// Last values the controller commanded for a light, plus whether a human
/// has changed the light since.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartOffBaseline {
    pub on: Option<bool>,
    pub bri: Option<u8>,
    pub ct: Option<u16>,
    pub active: bool,
}

impl SmartOffBaseline {
    pub fn from_reported(reported: &ReportedLightState) -> Self {
        Self {
            on: Some(reported.on),
            bri: reported.bri,
            ct: reported.ct,
            active: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub id: LightId,
    pub name: String,
    #[serde(rename = "type")]
    pub light_type: String,
    pub model_id: String,
    /// The app-level switch. `false` forces the light off.
    pub on: bool,
    pub on_controlled: bool,
    pub on_threshold: f64,
    pub bri_controlled: bool,
    pub bri_max: f64,
    pub ct_controlled: bool,
    pub bri_curve_id: Option<CurveId>,
    pub ct_curve_id: Option<CurveId>,
    pub smart_off: SmartOffBaseline,
}

impl Light {
    pub fn curve_id(&self, kind: CurveKind) -> Option<CurveId> {
        match kind {
            CurveKind::Bri => self.bri_curve_id,
            CurveKind::Ct => self.ct_curve_id,
        }
    }
}

/// Configuration change for a light; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightUpdate {
    pub on: Option<bool>,
    pub on_controlled: Option<bool>,
    pub on_threshold: Option<f64>,
    pub bri_controlled: Option<bool>,
    pub bri_max: Option<f64>,
    pub ct_controlled: Option<bool>,
    pub bri_curve_id: Option<CurveId>,
    pub ct_curve_id: Option<CurveId>,
}

impl LightUpdate {
    pub fn apply_to(&self, light: &mut Light) {
        if let Some(on) = self.on {
            light.on = on;
        }
        if let Some(on_controlled) = self.on_controlled {
            light.on_controlled = on_controlled;
        }
        if let Some(on_threshold) = self.on_threshold {
            light.on_threshold = on_threshold;
        }
        if let Some(bri_controlled) = self.bri_controlled {
            light.bri_controlled = bri_controlled;
        }
        if let Some(bri_max) = self.bri_max {
            light.bri_max = bri_max;
        }
        if let Some(ct_controlled) = self.ct_controlled {
            light.ct_controlled = ct_controlled;
        }
        if let Some(curve_id) = self.bri_curve_id {
            light.bri_curve_id = Some(curve_id);
        }
        if let Some(curve_id) = self.ct_curve_id {
            light.ct_curve_id = Some(curve_id);
        }
    }
}

/// Partial device state command. Only set fields are sent to the bridge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LightPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ct: Option<u16>,
}

impl LightPatch {
    pub fn off() -> Self {
        Self {
            on: Some(false),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.on.is_none() && self.bri.is_none() && self.ct.is_none()
    }
}

/// State of a light as reported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportedLightState {
    pub on: bool,
    pub bri: Option<u8>,
    pub ct: Option<u16>,
    pub reachable: bool,
}

impl ReportedLightState {
    /// The state expected after `patch` has been applied.
    pub fn overlay(mut self, patch: &LightPatch) -> Self {
        if let Some(on) = patch.on {
            self.on = on;
        }
        if let Some(bri) = patch.bri {
            self.bri = Some(bri);
        }
        if let Some(ct) = patch.ct {
            self.ct = Some(ct);
        }
        self
    }
}

/// A fixture as listed by the bridge inventory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureInfo {
    pub id: LightId,
    pub name: String,
    #[serde(rename = "type")]
    pub light_type: String,
    pub model_id: String,
}

/// A bridge group (room, zone or light group) and the lights it holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
    #[serde(rename = "type")]
    pub group_type: String,
    pub lights: Vec<LightId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub smart_off: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub enabled: bool,
}

/// Truncates a computed brightness into the bridge's accepted range.
pub fn hue_brightness(value: f64) -> u8 {
    value.trunc().clamp(f64::from(BRI_RANGE.0), f64::from(BRI_RANGE.1)) as u8
}

/// Truncates a computed color temperature (mired) into the bridge's range.
pub fn hue_color_temperature(value: f64) -> u16 {
    value.trunc().clamp(f64::from(CT_RANGE.0), f64::from(CT_RANGE.1)) as u16
}
