//! Integration tests for the HTTP estimation backend.
//!
//! Each test spins up a local axum server standing in for the hosted
//! callable function and drives [`AngleEstimationClient`] against it.

use std::io::Cursor;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_matches::assert_matches;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use serde_json::{json, Value};

use kneeflex_core::error::EstimationError;
use kneeflex_core::measurement::StaticIdentity;
use kneeflex_core::types::{InjuryTag, Side};
use kneeflex_estimation::api::CallableApi;
use kneeflex_estimation::backend::HttpEstimationBackend;
use kneeflex_estimation::client::AngleEstimationClient;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// What the fake function saw on its last invocation.
#[derive(Default)]
struct Seen {
    authorization: Option<String>,
    body: Option<Value>,
}

/// Serve `router` on an ephemeral port and return its base URL.
async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake backend");
    });
    format!("http://{addr}")
}

/// A fake function that records the request and answers with `status` and
/// a JSON `body`.
async fn json_backend(status: StatusCode, body: Value) -> (String, Arc<Mutex<Seen>>) {
    let seen = Arc::new(Mutex::new(Seen::default()));
    let recorder = seen.clone();

    let router = Router::new().route(
        "/estimateKneeAngle",
        post(move |headers: HeaderMap, Json(request): Json<Value>| {
            let recorder = recorder.clone();
            let body = body.clone();
            async move {
                let mut seen = recorder.lock().unwrap();
                seen.authorization = headers
                    .get("authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                seen.body = Some(request);
                (status, Json(body))
            }
        }),
    );

    (spawn_backend(router).await, seen)
}

/// A fake function that answers with a plain-text body.
async fn text_backend(status: StatusCode, body: &'static str) -> String {
    let router = Router::new().route(
        "/estimateKneeAngle",
        post(move || async move { (status, body).into_response() }),
    );
    spawn_backend(router).await
}

fn client(base_url: &str, token: Option<&str>, timeout: Duration) -> AngleEstimationClient {
    let api = CallableApi::new(base_url, "estimateKneeAngle", timeout).expect("http client");
    let identity = Arc::new(StaticIdentity::new(token.map(str::to_string)));
    AngleEstimationClient::new(Arc::new(HttpEstimationBackend::new(api, identity)))
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([30, 60, 90]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("encode png");
    buf
}

async fn estimate_error(base_url: &str) -> EstimationError {
    client(base_url, Some("tok"), Duration::from_secs(5))
        .estimate(&png(8, 8), None, None)
        .await
        .expect_err("estimate should fail")
}

// ---------------------------------------------------------------------------
// Test: successful estimates
// ---------------------------------------------------------------------------

#[tokio::test]
async fn result_envelope_is_decoded() {
    let (url, _) = json_backend(
        StatusCode::OK,
        json!({"result": {
            "angle": 87.6,
            "confidence": 0.82,
            "hip": {"x": 0.4, "y": 0.3},
            "knee": {"x": 0.5, "y": 0.55},
            "ankle": {"x": 0.7, "y": 0.6}
        }}),
    )
    .await;

    let result = client(&url, Some("tok"), Duration::from_secs(5))
        .estimate(&png(40, 30), Some(Side::Right), None)
        .await
        .unwrap();

    assert_eq!(result.angle_degrees, 88);
    assert_eq!(result.confidence, 0.82);
    assert_eq!(result.knee.x, 0.5);
    assert!(!result.defaulted.any());
}

#[tokio::test]
async fn out_of_range_angle_is_clamped() {
    let (url, _) = json_backend(StatusCode::OK, json!({"result": {"angle": -12}})).await;

    let result = client(&url, None, Duration::from_secs(5))
        .estimate(&png(8, 8), None, None)
        .await
        .unwrap();

    assert_eq!(result.angle_degrees, 0);
    assert_eq!(result.confidence, 0.8);
    assert!(result.defaulted.confidence);
}

// ---------------------------------------------------------------------------
// Test: request shape
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bearer_token_and_context_are_sent() {
    let (url, seen) = json_backend(StatusCode::OK, json!({"result": {"angle": 30}})).await;

    client(&url, Some("id-token-123"), Duration::from_secs(5))
        .estimate(&png(64, 48), Some(Side::Left), Some(InjuryTag::AclReconstruction))
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.authorization.as_deref(), Some("Bearer id-token-123"));

    let data = &seen.body.as_ref().unwrap()["data"];
    assert_eq!(data["injuredSide"], "left");
    assert_eq!(data["injuryContext"], InjuryTag::AclReconstruction.as_str());

    let jpeg = base64::engine::general_purpose::STANDARD
        .decode(data["image"].as_str().unwrap())
        .unwrap();
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "payload should be a JPEG");
    let decoded = image::load_from_memory(&jpeg).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (64, 48));
}

#[tokio::test]
async fn anonymous_call_omits_optional_fields() {
    let (url, seen) = json_backend(StatusCode::OK, json!({"result": {"angle": 30}})).await;

    client(&url, None, Duration::from_secs(5))
        .estimate(&png(8, 8), None, None)
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.authorization, None);

    let data = seen.body.as_ref().unwrap()["data"].as_object().unwrap();
    assert!(data.contains_key("image"));
    assert!(!data.contains_key("injuredSide"));
    assert!(!data.contains_key("injuryContext"));
}

// ---------------------------------------------------------------------------
// Test: error classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resource_exhausted_is_rate_limited() {
    let (url, _) = json_backend(
        StatusCode::TOO_MANY_REQUESTS,
        json!({"error": {"status": "RESOURCE_EXHAUSTED", "message": "quota"}}),
    )
    .await;
    assert_matches!(estimate_error(&url).await, EstimationError::RateLimited(m) if m == "quota");
}

#[tokio::test]
async fn unauthenticated_status_is_classified() {
    let (url, _) = json_backend(
        StatusCode::UNAUTHORIZED,
        json!({"error": {"status": "UNAUTHENTICATED", "message": "sign in"}}),
    )
    .await;
    assert_matches!(estimate_error(&url).await, EstimationError::Unauthenticated(_));
}

#[tokio::test]
async fn deadline_exceeded_is_timeout() {
    let (url, _) = json_backend(
        StatusCode::GATEWAY_TIMEOUT,
        json!({"error": {"status": "DEADLINE_EXCEEDED", "message": "slow model"}}),
    )
    .await;
    assert_matches!(estimate_error(&url).await, EstimationError::Timeout(_));
}

#[tokio::test]
async fn invalid_argument_is_invalid_input() {
    let (url, _) = json_backend(
        StatusCode::BAD_REQUEST,
        json!({"error": {"status": "INVALID_ARGUMENT", "message": "image missing"}}),
    )
    .await;
    assert_matches!(estimate_error(&url).await, EstimationError::InvalidInput(_));
}

#[tokio::test]
async fn plain_text_server_error_is_internal() {
    let url = text_backend(StatusCode::INTERNAL_SERVER_ERROR, "upstream crashed").await;
    let err = estimate_error(&url).await;
    assert_matches!(err, EstimationError::Internal(_));
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn non_json_success_is_malformed() {
    let url = text_backend(StatusCode::OK, "<html>maintenance</html>").await;
    assert_matches!(estimate_error(&url).await, EstimationError::MalformedResponse(_));
}

#[tokio::test]
async fn missing_angle_is_reported() {
    let (url, _) = json_backend(StatusCode::OK, json!({"result": {"confidence": 0.9}})).await;
    assert_matches!(estimate_error(&url).await, EstimationError::MissingAngle);
}

#[tokio::test]
async fn slow_backend_times_out() {
    let router = Router::new().route(
        "/estimateKneeAngle",
        post(|| async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Json(json!({"result": {"angle": 10}}))
        }),
    );
    let url = spawn_backend(router).await;

    let err = client(&url, None, Duration::from_millis(200))
        .estimate(&png(8, 8), None, None)
        .await
        .unwrap_err();

    assert_matches!(err, EstimationError::Timeout(_));
    assert!(err.user_message().contains("simpler photo"));
}

#[tokio::test]
async fn unreachable_backend_is_internal() {
    // Bind and drop to get a port with nothing listening.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    assert_matches!(
        estimate_error(&format!("http://{addr}")).await,
        EstimationError::Internal(_)
    );
}
