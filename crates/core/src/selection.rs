//! Choosing which leg's keypoints feed the geometric calculator.
//!
//! Pose detectors return zero or more candidate skeletons with independent
//! per-joint confidences. Selection order:
//!
//! 1. the injured side, if given and all three joints clear the threshold;
//! 2. otherwise the opposite side under the same threshold;
//! 3. otherwise [`EstimationError::NoReliableKeypoints`].
//!
//! An explicit side preference wins over a more confident opposite leg.

use std::collections::BTreeMap;

use crate::error::EstimationError;
use crate::geometry::knee_angle_checked;
use crate::types::{clamp_confidence, Keypoint, Side};

/// Default minimum per-joint confidence.
pub const DEFAULT_KEYPOINT_THRESHOLD: f64 = 0.3;

/// The joints this crate consumes from a pose detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Joint {
    LeftHip,
    LeftKnee,
    LeftAnkle,
    RightHip,
    RightKnee,
    RightAnkle,
}

impl Joint {
    /// Hip, knee and ankle joints of one side, in that order.
    pub fn leg(side: Side) -> [Joint; 3] {
        match side {
            Side::Left => [Joint::LeftHip, Joint::LeftKnee, Joint::LeftAnkle],
            Side::Right => [Joint::RightHip, Joint::RightKnee, Joint::RightAnkle],
        }
    }
}

/// One detected person. Undetected joints are absent, never zero-filled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Skeleton {
    joints: BTreeMap<Joint, Keypoint>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_joint(mut self, joint: Joint, keypoint: Keypoint) -> Self {
        self.joints.insert(joint, keypoint);
        self
    }

    pub fn insert(&mut self, joint: Joint, keypoint: Keypoint) {
        self.joints.insert(joint, keypoint);
    }

    pub fn joint(&self, joint: Joint) -> Option<Keypoint> {
        self.joints.get(&joint).copied()
    }

    /// All three keypoints of one leg, if every joint was detected.
    pub fn leg(&self, side: Side) -> Option<LegKeypoints> {
        let [hip, knee, ankle] = Joint::leg(side);
        Some(LegKeypoints {
            side,
            hip: self.joint(hip)?,
            knee: self.joint(knee)?,
            ankle: self.joint(ankle)?,
        })
    }

    /// Mean confidence over all six leg joints; missing joints count as 0.
    pub fn leg_score(&self) -> f64 {
        let joints = Joint::leg(Side::Left)
            .into_iter()
            .chain(Joint::leg(Side::Right));
        let total: f64 = joints
            .map(|j| self.joint(j).map_or(0.0, |k| joint_confidence(&k)))
            .sum();
        total / 6.0
    }
}

/// Hip, knee and ankle of a single leg.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegKeypoints {
    pub side: Side,
    pub hip: Keypoint,
    pub knee: Keypoint,
    pub ankle: Keypoint,
}

impl LegKeypoints {
    /// Non-finite joint confidences count as 0.
    pub fn min_confidence(&self) -> f64 {
        joint_confidence(&self.hip)
            .min(joint_confidence(&self.knee))
            .min(joint_confidence(&self.ankle))
    }

    pub fn mean_confidence(&self) -> f64 {
        (joint_confidence(&self.hip) + joint_confidence(&self.knee) + joint_confidence(&self.ankle))
            / 3.0
    }

    /// `true` when every joint's confidence is at least `threshold`.
    pub fn clears(&self, threshold: f64) -> bool {
        self.min_confidence() >= threshold
    }

    /// Knee angle for this leg, rejecting degenerate positions.
    pub fn angle(&self) -> Result<i32, EstimationError> {
        knee_angle_checked(
            self.hip.position(),
            self.knee.position(),
            self.ankle.position(),
        )
    }
}

/// Validate a keypoint confidence threshold.
pub fn validate_threshold(threshold: f64) -> Result<(), EstimationError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(EstimationError::InvalidInput(format!(
            "Keypoint threshold must be within [0, 1] (got {threshold})"
        )));
    }
    Ok(())
}

/// Apply the side-precedence policy to one skeleton.
///
/// Without a preferred side, the leg whose weakest joint is more confident
/// is tried first.
pub fn select_leg(
    skeleton: &Skeleton,
    injured_side: Option<Side>,
    threshold: f64,
) -> Result<LegKeypoints, EstimationError> {
    let first = match injured_side {
        Some(side) => side,
        None => stronger_side(skeleton),
    };

    for side in [first, first.opposite()] {
        if let Some(leg) = skeleton.leg(side) {
            if leg.clears(threshold) {
                return Ok(leg);
            }
        }
    }

    Err(EstimationError::NoReliableKeypoints(format!(
        "no leg has hip, knee and ankle at confidence >= {threshold}"
    )))
}

/// Apply [`select_leg`] across candidates, most confident skeleton first.
pub fn select_from_candidates(
    skeletons: &[Skeleton],
    injured_side: Option<Side>,
    threshold: f64,
) -> Result<LegKeypoints, EstimationError> {
    if skeletons.is_empty() {
        return Err(EstimationError::NoReliableKeypoints(
            "no person detected in the image".to_string(),
        ));
    }

    let mut ordered: Vec<&Skeleton> = skeletons.iter().collect();
    ordered.sort_by(|a, b| b.leg_score().total_cmp(&a.leg_score()));

    for skeleton in ordered {
        if let Ok(leg) = select_leg(skeleton, injured_side, threshold) {
            return Ok(leg);
        }
    }

    Err(EstimationError::NoReliableKeypoints(format!(
        "none of {} detected people has a leg with confidence >= {threshold}",
        skeletons.len()
    )))
}

/// Detector confidence in `[0, 1]`; NaN and infinities read as 0.
fn joint_confidence(keypoint: &Keypoint) -> f64 {
    if keypoint.confidence.is_finite() {
        clamp_confidence(keypoint.confidence)
    } else {
        0.0
    }
}

fn stronger_side(skeleton: &Skeleton) -> Side {
    let weakest = |side| {
        skeleton
            .leg(side)
            .map_or(f64::NEG_INFINITY, |leg| leg.min_confidence())
    };
    if weakest(Side::Right) > weakest(Side::Left) {
        Side::Right
    } else {
        Side::Left
    }
}
