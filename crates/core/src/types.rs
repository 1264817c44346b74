//! Value types shared across the workspace.
//!
//! Everything here is an immutable value object: requests and results are
//! built per call, compared by value and never mutated in place.

use serde::{Deserialize, Serialize};

use crate::error::EstimationError;

/// Smallest reportable knee angle (fully straight).
pub const MIN_ANGLE_DEGREES: i32 = 0;

/// Largest reportable knee angle.
pub const MAX_ANGLE_DEGREES: i32 = 180;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identifier assigned to stored measurement records.
pub type RecordId = uuid::Uuid;

/* --------------------------------------------------------------------------
Side / injury context
-------------------------------------------------------------------------- */

/// Which leg to prioritise when both are visible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Self::Left => Self::Right,
            Self::Right => Self::Left,
        }
    }

    /// Wire name (`"left"` / `"right"`).
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }

    /// Parse a wire or user-supplied name, case-insensitively.
    pub fn from_name(name: &str) -> Result<Self, EstimationError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(EstimationError::InvalidInput(format!(
                "Unknown side '{other}'. Must be one of: left, right"
            ))),
        }
    }
}

/// Closed set of injury classifications that may accompany a request.
///
/// Only enriches the backend's interpretation; never changes the response
/// schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InjuryTag {
    AclReconstruction,
    AclWithMeniscus,
    MeniscusRepair,
    MclInjury,
    KneeReplacement,
    Other,
}

/// Every valid injury tag name, in declaration order.
pub const ALL_INJURY_TAGS: &[&str] = &[
    "acl_reconstruction",
    "acl_with_meniscus",
    "meniscus_repair",
    "mcl_injury",
    "knee_replacement",
    "other",
];

impl InjuryTag {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AclReconstruction => "acl_reconstruction",
            Self::AclWithMeniscus => "acl_with_meniscus",
            Self::MeniscusRepair => "meniscus_repair",
            Self::MclInjury => "mcl_injury",
            Self::KneeReplacement => "knee_replacement",
            Self::Other => "other",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, EstimationError> {
        match name.trim() {
            "acl_reconstruction" => Ok(Self::AclReconstruction),
            "acl_with_meniscus" => Ok(Self::AclWithMeniscus),
            "meniscus_repair" => Ok(Self::MeniscusRepair),
            "mcl_injury" => Ok(Self::MclInjury),
            "knee_replacement" => Ok(Self::KneeReplacement),
            "other" => Ok(Self::Other),
            other => Err(EstimationError::InvalidInput(format!(
                "Unknown injury context '{other}'. Valid tags: {}",
                ALL_INJURY_TAGS.join(", ")
            ))),
        }
    }
}

/* --------------------------------------------------------------------------
Points and keypoints
-------------------------------------------------------------------------- */

/// A 2D position, in pixel or normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A detected joint position plus detection confidence in `[0, 1]`.
///
/// A keypoint with `confidence == 0` carries no positional meaning; see
/// [`Keypoint::UNKNOWN`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub confidence: f64,
}

impl Keypoint {
    /// Placeholder for "no real data". Never render or trust it.
    pub const UNKNOWN: Keypoint = Keypoint {
        x: 0.0,
        y: 0.0,
        confidence: 0.0,
    };

    pub const fn new(x: f64, y: f64, confidence: f64) -> Self {
        Self { x, y, confidence }
    }

    /// `true` when the keypoint carries a real measurement.
    pub fn is_known(&self) -> bool {
        self.confidence > 0.0
    }

    pub fn position(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

/* --------------------------------------------------------------------------
Angle result
-------------------------------------------------------------------------- */

/// Which path produced an [`AngleResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AngleSource {
    /// Hosted estimation backend.
    Backend,
    /// On-device pose detection plus the geometric calculator.
    Pose,
}

/// Fields that were filled with a lenient default while decoding.
///
/// Lenient defaults are deliberate, not errors, but they are always
/// reported so callers can tell a measured value from a fallback.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultedFields {
    pub confidence: bool,
    pub hip: bool,
    pub knee: bool,
    pub ankle: bool,
}

impl DefaultedFields {
    pub fn any(&self) -> bool {
        self.confidence || self.hip || self.knee || self.ankle
    }
}

/// The single value both estimation paths converge on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AngleResult {
    /// Always within `[0, 180]`.
    pub angle_degrees: i32,
    /// Always within `[0, 1]`.
    pub confidence: f64,
    pub hip: Keypoint,
    pub knee: Keypoint,
    pub ankle: Keypoint,
    pub source: AngleSource,
    pub defaulted: DefaultedFields,
}

/// Round `raw` to the nearest degree (half away from zero) and clamp it
/// into `[0, 180]`.
///
/// Non-finite input clamps to the nearest bound; NaN maps to 0.
pub fn clamp_angle_degrees(raw: f64) -> i32 {
    if raw.is_nan() {
        return MIN_ANGLE_DEGREES;
    }
    let rounded = raw.round();
    if rounded <= MIN_ANGLE_DEGREES as f64 {
        MIN_ANGLE_DEGREES
    } else if rounded >= MAX_ANGLE_DEGREES as f64 {
        MAX_ANGLE_DEGREES
    } else {
        rounded as i32
    }
}

/// Clamp a confidence value into `[0, 1]`. NaN maps to 0.
pub fn clamp_confidence(raw: f64) -> f64 {
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}
