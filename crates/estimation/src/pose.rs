//! On-device estimation from pose keypoints.
//!
//! A [`PoseDetector`] yields candidate skeletons; the selection policy picks
//! one leg and the geometric calculator turns it into an [`AngleResult`].

use std::sync::Arc;

use async_trait::async_trait;

use kneeflex_core::error::EstimationError;
use kneeflex_core::image_prep::{prepare_image, ImagePolicy, PreparedImage};
use kneeflex_core::selection::{
    select_from_candidates, validate_threshold, LegKeypoints, Skeleton,
    DEFAULT_KEYPOINT_THRESHOLD,
};
use kneeflex_core::types::{AngleResult, AngleSource, DefaultedFields, Side};

/// Detects people in a prepared image.
#[async_trait]
pub trait PoseDetector: Send + Sync {
    /// Zero or more candidate skeletons. Keypoint coordinates may be in
    /// pixels or normalized, as long as a skeleton is consistent.
    async fn detect(&self, image: &PreparedImage) -> Result<Vec<Skeleton>, EstimationError>;
}

/// Estimates knee angles from a [`PoseDetector`] without the network.
#[derive(Clone)]
pub struct PoseEstimator {
    detector: Arc<dyn PoseDetector>,
    policy: ImagePolicy,
    threshold: f64,
}

impl PoseEstimator {
    pub fn new(detector: Arc<dyn PoseDetector>) -> Self {
        Self {
            detector,
            policy: ImagePolicy::default(),
            threshold: DEFAULT_KEYPOINT_THRESHOLD,
        }
    }

    pub fn with_image_policy(mut self, policy: ImagePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Minimum per-joint confidence, in `[0, 1]`.
    pub fn with_threshold(mut self, threshold: f64) -> Result<Self, EstimationError> {
        validate_threshold(threshold)?;
        self.threshold = threshold;
        Ok(self)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub async fn estimate(
        &self,
        image: &[u8],
        injured_side: Option<Side>,
    ) -> Result<AngleResult, EstimationError> {
        let prepared = prepare_image(image, &self.policy)?;
        self.estimate_prepared(&prepared, injured_side).await
    }

    pub async fn estimate_prepared(
        &self,
        image: &PreparedImage,
        injured_side: Option<Side>,
    ) -> Result<AngleResult, EstimationError> {
        let skeletons = self.detector.detect(image).await?;
        let leg = select_from_candidates(&skeletons, injured_side, self.threshold)?;
        let result = result_from_leg(&leg)?;

        tracing::info!(
            candidates = skeletons.len(),
            side = leg.side.as_str(),
            angle_degrees = result.angle_degrees,
            confidence = result.confidence,
            "Knee angle computed from pose keypoints",
        );

        Ok(result)
    }
}

/// Build an [`AngleResult`] from one leg's keypoints.
///
/// Confidence is the mean of the three joint confidences.
pub fn result_from_leg(leg: &LegKeypoints) -> Result<AngleResult, EstimationError> {
    Ok(AngleResult {
        angle_degrees: leg.angle()?,
        confidence: leg.mean_confidence(),
        hip: leg.hip,
        knee: leg.knee,
        ankle: leg.ankle,
        source: AngleSource::Pose,
        defaulted: DefaultedFields::default(),
    })
}
