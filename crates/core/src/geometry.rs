//! Knee angle from three joint positions.
//!
//! This is the only implementation of the calculation; every call site
//! (backend fallback, on-device pose detection, preview overlays) goes
//! through [`compute_knee_angle`] so reported angles stay comparable.

use crate::error::EstimationError;
use crate::types::Point;

/// Vectors shorter than this are treated as zero-length.
const MIN_SEGMENT_LENGTH: f64 = 1e-9;

/// Compute the knee flexion angle in whole degrees.
///
/// Both vectors originate at the knee: `hip - knee` and `ankle - knee`.
/// The interior angle between them is 180° for a straight leg, so the
/// reported value is `round(180 - interior)`: 0° means fully straight,
/// larger values mean more bend.
///
/// The result depends only on vector directions, so it is the same in
/// pixel or normalized coordinates, and under a flip of either axis.
///
/// Precondition: `hip != knee` and `ankle != knee`. Use
/// [`knee_angle_checked`] when the inputs have not been validated.
pub fn compute_knee_angle(hip: Point, knee: Point, ankle: Point) -> i32 {
    let v1 = (hip.x - knee.x, hip.y - knee.y);
    let v2 = (ankle.x - knee.x, ankle.y - knee.y);

    let dot = v1.0 * v2.0 + v1.1 * v2.1;
    let mag1 = (v1.0 * v1.0 + v1.1 * v1.1).sqrt();
    let mag2 = (v2.0 * v2.0 + v2.1 * v2.1).sqrt();

    // Floating-point drift can push the ratio just outside acos' domain.
    let cos_theta = (dot / (mag1 * mag2)).clamp(-1.0, 1.0);
    let interior = cos_theta.acos().to_degrees();

    (180.0 - interior).round() as i32
}

/// Reject inputs [`compute_knee_angle`] cannot measure: non-finite
/// coordinates or a zero-length thigh/shin segment.
pub fn validate_leg_points(hip: Point, knee: Point, ankle: Point) -> Result<(), EstimationError> {
    for (name, p) in [("hip", hip), ("knee", knee), ("ankle", ankle)] {
        if !p.x.is_finite() || !p.y.is_finite() {
            return Err(EstimationError::InvalidInput(format!(
                "{name} keypoint has non-finite coordinates"
            )));
        }
    }
    if segment_length(hip, knee) < MIN_SEGMENT_LENGTH {
        return Err(EstimationError::InvalidInput(
            "hip and knee keypoints coincide".to_string(),
        ));
    }
    if segment_length(knee, ankle) < MIN_SEGMENT_LENGTH {
        return Err(EstimationError::InvalidInput(
            "knee and ankle keypoints coincide".to_string(),
        ));
    }
    Ok(())
}

/// [`validate_leg_points`] followed by [`compute_knee_angle`].
pub fn knee_angle_checked(hip: Point, knee: Point, ankle: Point) -> Result<i32, EstimationError> {
    validate_leg_points(hip, knee, ankle)?;
    Ok(compute_knee_angle(hip, knee, ankle))
}

fn segment_length(a: Point, b: Point) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}
