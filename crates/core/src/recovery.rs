//! Recovery timeline helpers: post-op weeks and goal progress.

use chrono::NaiveDate;

use crate::measurement::MeasurementKind;

/// Flexion angle treated as the full-flexion goal.
pub const FLEXION_GOAL_DEGREES: i32 = 135;

/// Extension goal: a fully straight leg.
pub const EXTENSION_GOAL_DEGREES: i32 = 0;

/// Whole weeks elapsed between `surgery_date` and `on_date`.
///
/// Returns `None` when `on_date` precedes the surgery.
pub fn post_op_week(surgery_date: NaiveDate, on_date: NaiveDate) -> Option<u32> {
    let days = on_date.signed_duration_since(surgery_date).num_days();
    if days < 0 {
        return None;
    }
    u32::try_from(days / 7).ok()
}

/// Fraction of the way to the goal for `kind`, in `[0, 1]`.
///
/// Flexion improves as the angle grows toward 135°; extension improves as
/// the angle shrinks toward 0°.
pub fn goal_progress(kind: MeasurementKind, angle_degrees: i32) -> f64 {
    let ratio = angle_degrees as f64 / FLEXION_GOAL_DEGREES as f64;
    let progress = match kind {
        MeasurementKind::Flexion => ratio,
        MeasurementKind::Extension => 1.0 - ratio,
    };
    progress.clamp(0.0, 1.0)
}
