//! One capture: photo in, measurement out.

use std::path::Path;

use serde::Serialize;

use kneeflex_core::error::EstimationError;
use kneeflex_core::measurement::{MeasurementRecord, MeasurementStore};
use kneeflex_core::recovery::goal_progress;
use kneeflex_core::types::{AngleResult, Timestamp};
use kneeflex_estimation::estimator::AngleEstimator;

use crate::config::CaptureConfig;

/// Printed to stdout after a successful capture.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureReport {
    pub result: AngleResult,
    pub record: MeasurementRecord,
    /// Fraction of the way to the goal for the measured kind.
    pub goal_progress: f64,
    pub saved: bool,
}

/// Estimate the angle in the photo at `photo` and, when a store is given,
/// save the measurement.
pub async fn capture(
    estimator: &AngleEstimator,
    store: Option<&dyn MeasurementStore>,
    photo: &Path,
    config: &CaptureConfig,
    measured_at: Timestamp,
) -> Result<CaptureReport, EstimationError> {
    let bytes = tokio::fs::read(photo).await.map_err(|e| {
        EstimationError::InvalidInput(format!("cannot read photo {}: {e}", photo.display()))
    })?;

    let result = estimator
        .estimate(&bytes, config.injured_side, config.injury_context)
        .await?;

    let record = MeasurementRecord::from_result(
        &result,
        config.measurement_kind,
        measured_at,
        config.surgery_date,
    )
    .with_photo_path(photo.display().to_string());

    let saved = match store {
        Some(store) => {
            store.save(&record).await?;
            true
        }
        None => false,
    };

    tracing::info!(
        id = %record.id,
        kind = record.kind.as_str(),
        angle_degrees = record.angle_degrees,
        post_op_week = record.post_op_week,
        saved,
        "Measurement captured",
    );

    Ok(CaptureReport {
        goal_progress: goal_progress(record.kind, record.angle_degrees),
        result,
        record,
        saved,
    })
}
