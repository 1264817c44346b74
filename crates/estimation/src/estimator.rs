//! Network estimation with an optional on-device fallback.

use kneeflex_core::error::EstimationError;
use kneeflex_core::image_prep::prepare_image;
use kneeflex_core::types::{AngleResult, InjuryTag, Side};

use crate::client::AngleEstimationClient;
use crate::pose::PoseEstimator;

/// Calls the backend once; when it is unreachable, overloaded or slow and a
/// pose estimator is configured, measures on-device instead.
///
/// Caller mistakes (bad image, missing sign-in) and uninterpretable
/// backend answers are never masked by the fallback.
#[derive(Clone)]
pub struct AngleEstimator {
    client: AngleEstimationClient,
    fallback: Option<PoseEstimator>,
}

impl AngleEstimator {
    pub fn new(client: AngleEstimationClient) -> Self {
        Self {
            client,
            fallback: None,
        }
    }

    pub fn with_fallback(mut self, fallback: PoseEstimator) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn has_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub async fn estimate(
        &self,
        image: &[u8],
        injured_side: Option<Side>,
        injury_context: Option<InjuryTag>,
    ) -> Result<AngleResult, EstimationError> {
        let prepared = prepare_image(image, self.client.image_policy())?;

        let network_error = match self
            .client
            .estimate_prepared(&prepared, injured_side, injury_context)
            .await
        {
            Ok(result) => return Ok(result),
            Err(e) => e,
        };

        let fallback = match &self.fallback {
            Some(fallback) if should_fall_back(&network_error) => fallback,
            _ => return Err(network_error),
        };

        tracing::warn!(
            kind = network_error.kind().code(),
            error = %network_error,
            "Backend estimation unavailable, using on-device pose estimation",
        );

        match fallback.estimate_prepared(&prepared, injured_side).await {
            Ok(result) => Ok(result),
            Err(fallback_error) => {
                tracing::warn!(error = %fallback_error, "On-device fallback failed");
                Err(network_error)
            }
        }
    }
}

/// Whether `err` means network estimation is unavailable right now.
pub fn should_fall_back(err: &EstimationError) -> bool {
    matches!(
        err,
        EstimationError::Timeout(_) | EstimationError::RateLimited(_) | EstimationError::Internal(_)
    )
}
