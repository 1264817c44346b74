//! Network angle estimation.
//!
//! [`AngleEstimationClient`] prepares the photo, sends it to an injected
//! [`EstimationBackend`] and validates the answer. It performs no retries:
//! every failure is returned to the caller, classified.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use kneeflex_core::error::EstimationError;
use kneeflex_core::image_prep::{prepare_image, ImagePolicy, PreparedImage};
use kneeflex_core::types::{AngleResult, InjuryTag, Side};

use crate::backend::EstimationBackend;
use crate::wire::{decode_response, DecodeOptions, EstimationRequest};

/// Client for the hosted angle estimation backend.
///
/// Construct once at startup and pass it to whatever needs it; cloning is
/// cheap.
#[derive(Clone)]
pub struct AngleEstimationClient {
    backend: Arc<dyn EstimationBackend>,
    policy: ImagePolicy,
    decode: DecodeOptions,
}

impl AngleEstimationClient {
    pub fn new(backend: Arc<dyn EstimationBackend>) -> Self {
        Self {
            backend,
            policy: ImagePolicy::default(),
            decode: DecodeOptions::default(),
        }
    }

    pub fn with_image_policy(mut self, policy: ImagePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_decode_options(mut self, decode: DecodeOptions) -> Self {
        self.decode = decode;
        self
    }

    pub fn image_policy(&self) -> &ImagePolicy {
        &self.policy
    }

    /// Estimate the knee angle in `image` (any decodable still image).
    pub async fn estimate(
        &self,
        image: &[u8],
        injured_side: Option<Side>,
        injury_context: Option<InjuryTag>,
    ) -> Result<AngleResult, EstimationError> {
        let prepared = prepare_image(image, &self.policy)?;
        self.estimate_prepared(&prepared, injured_side, injury_context)
            .await
    }

    /// Estimate from an image already prepared with [`prepare_image`].
    pub async fn estimate_prepared(
        &self,
        image: &PreparedImage,
        injured_side: Option<Side>,
        injury_context: Option<InjuryTag>,
    ) -> Result<AngleResult, EstimationError> {
        let request = EstimationRequest::new(image, injured_side, injury_context);

        tracing::info!(
            width = image.width,
            height = image.height,
            jpeg_bytes = image.jpeg.len(),
            injured_side = injured_side.map(Side::as_str),
            injury_context = injury_context.map(InjuryTag::as_str),
            "Requesting knee angle estimate",
        );

        let payload = self.backend.estimate_angle(&request).await.map_err(|e| {
            tracing::warn!(kind = e.kind().code(), error = %e, "Angle estimation failed");
            e
        })?;

        let result = decode_response(&payload, &self.decode)?;

        tracing::info!(
            angle_degrees = result.angle_degrees,
            confidence = result.confidence,
            lenient_defaults = result.defaulted.any(),
            "Knee angle estimated",
        );

        Ok(result)
    }

    /// [`estimate`](Self::estimate), abandoned when `cancel` fires.
    ///
    /// Returns `None` on cancellation; no result or error is reported for an
    /// abandoned call.
    pub async fn estimate_cancellable(
        &self,
        image: &[u8],
        injured_side: Option<Side>,
        injury_context: Option<InjuryTag>,
        cancel: &CancellationToken,
    ) -> Option<Result<AngleResult, EstimationError>> {
        run_cancellable(self.estimate(image, injured_side, injury_context), cancel).await
    }
}

/// Drive `future` to completion unless `cancel` fires first.
pub async fn run_cancellable<F, T>(future: F, cancel: &CancellationToken) -> Option<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            tracing::info!("Estimation cancelled by caller");
            None
        }
        output = future => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays a fixed answer and records every request.
    struct FakeBackend {
        answer: Mutex<Option<Result<Value, EstimationError>>>,
        requests: Mutex<Vec<EstimationRequest>>,
    }

    impl FakeBackend {
        fn answering(answer: Result<Value, EstimationError>) -> Arc<Self> {
            Arc::new(Self {
                answer: Mutex::new(Some(answer)),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl EstimationBackend for FakeBackend {
        async fn estimate_angle(
            &self,
            request: &EstimationRequest,
        ) -> Result<Value, EstimationError> {
            self.requests.lock().unwrap().push(request.clone());
            self.answer
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(EstimationError::Internal("called twice".into())))
        }
    }

    /// Never answers.
    struct HangingBackend;

    #[async_trait]
    impl EstimationBackend for HangingBackend {
        async fn estimate_angle(&self, _: &EstimationRequest) -> Result<Value, EstimationError> {
            std::future::pending().await
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_pixel(width, height, image::Rgb([90, 120, 150]));
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn successful_estimate_is_decoded_and_clamped() {
        let backend = FakeBackend::answering(Ok(json!({"angle": 197.2, "confidence": 0.91})));
        let client = AngleEstimationClient::new(backend.clone());

        let result = client.estimate(&png(32, 24), None, None).await.unwrap();

        assert_eq!(result.angle_degrees, 180);
        assert_eq!(result.confidence, 0.91);
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn request_carries_context_and_resized_jpeg() {
        let backend = FakeBackend::answering(Ok(json!({"angle": 40})));
        let client = AngleEstimationClient::new(backend.clone()).with_image_policy(ImagePolicy {
            max_dimension: 16,
            jpeg_quality: 80,
        });

        client
            .estimate(&png(64, 32), Some(Side::Left), Some(InjuryTag::MeniscusRepair))
            .await
            .unwrap();

        let requests = backend.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.injured_side, Some(Side::Left));
        assert_eq!(request.injury_context, Some(InjuryTag::MeniscusRepair));

        use base64::Engine;
        let jpeg = base64::engine::general_purpose::STANDARD
            .decode(&request.image)
            .unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[tokio::test]
    async fn invalid_image_never_reaches_backend() {
        let backend = FakeBackend::answering(Ok(json!({"angle": 40})));
        let client = AngleEstimationClient::new(backend.clone());

        assert_matches!(
            client.estimate(&[], None, None).await,
            Err(EstimationError::InvalidInput(_))
        );
        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn backend_errors_propagate_without_retry() {
        let backend = FakeBackend::answering(Err(EstimationError::RateLimited("quota".into())));
        let client = AngleEstimationClient::new(backend.clone());

        assert_matches!(
            client.estimate(&png(8, 8), None, None).await,
            Err(EstimationError::RateLimited(_))
        );
        assert_eq!(backend.requests.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_payload_is_reported() {
        let backend = FakeBackend::answering(Ok(json!({"degrees": 40})));
        let client = AngleEstimationClient::new(backend);

        assert_matches!(
            client.estimate(&png(8, 8), None, None).await,
            Err(EstimationError::MissingAngle)
        );
    }

    #[tokio::test]
    async fn cancellation_reports_nothing() {
        let client = AngleEstimationClient::new(Arc::new(HangingBackend));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let outcome = client
            .estimate_cancellable(&png(8, 8), None, None, &cancel)
            .await;
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn uncancelled_call_completes() {
        let backend = FakeBackend::answering(Ok(json!({"angle": 12})));
        let client = AngleEstimationClient::new(backend);
        let cancel = CancellationToken::new();

        let outcome = client
            .estimate_cancellable(&png(8, 8), None, None, &cancel)
            .await;
        assert_eq!(outcome.unwrap().unwrap().angle_degrees, 12);
    }
}
