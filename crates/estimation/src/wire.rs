//! Wire contract for the angle estimation backend.
//!
//! Requests serialize with camelCase keys and omit absent context fields
//! entirely. Responses are decoded from untyped JSON by
//! [`decode_response`], the single place the validation rules live:
//!
//! 1. payload must be a JSON object, else `MalformedResponse`;
//! 2. `angle` must be a number, else `MissingAngle`;
//! 3. `angle` is rounded and clamped into `[0, 180]`;
//! 4. `confidence` defaults when absent or non-numeric;
//! 5. each of `hip`/`knee`/`ankle` defaults to [`Keypoint::UNKNOWN`] when
//!    absent, not an object, or without any numeric coordinate; when only
//!    one of `x`/`y` is numeric the other defaults to 0;
//! 6. `source` defaults to [`AngleSource::Backend`].

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use kneeflex_core::error::EstimationError;
use kneeflex_core::image_prep::PreparedImage;
use kneeflex_core::types::{
    clamp_angle_degrees, clamp_confidence, AngleResult, AngleSource, DefaultedFields,
    InjuryTag, Keypoint, Side,
};

/// Confidence reported when the backend omits one.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Request body sent to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EstimationRequest {
    /// Standard base64 of the prepared JPEG.
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injured_side: Option<Side>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub injury_context: Option<InjuryTag>,
}

impl EstimationRequest {
    pub fn new(
        image: &PreparedImage,
        injured_side: Option<Side>,
        injury_context: Option<InjuryTag>,
    ) -> Self {
        Self {
            image: base64::engine::general_purpose::STANDARD.encode(&image.jpeg),
            injured_side,
            injury_context,
        }
    }
}

/// Typed form of a success response, used when producing wire payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimationResponse {
    pub angle: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hip: Option<WirePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knee: Option<WirePoint>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ankle: Option<WirePoint>,
    /// Which path produced the angle; absent means the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<AngleSource>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WirePoint {
    pub x: f64,
    pub y: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

/// Options for [`decode_response`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
    pub default_confidence: f64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            default_confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl DecodeOptions {
    pub fn validate(&self) -> Result<(), EstimationError> {
        if !(0.0..=1.0).contains(&self.default_confidence) {
            return Err(EstimationError::InvalidInput(format!(
                "Default confidence must be within [0, 1] (got {})",
                self.default_confidence
            )));
        }
        Ok(())
    }
}

/// Validate and normalize a backend response payload.
pub fn decode_response(
    payload: &Value,
    options: &DecodeOptions,
) -> Result<AngleResult, EstimationError> {
    let obj = payload.as_object().ok_or_else(|| {
        EstimationError::MalformedResponse(format!(
            "expected a JSON object, got {}",
            json_type_name(payload)
        ))
    })?;

    let raw_angle = obj
        .get("angle")
        .and_then(Value::as_f64)
        .ok_or(EstimationError::MissingAngle)?;
    let angle_degrees = clamp_angle_degrees(raw_angle);

    let mut defaulted = DefaultedFields::default();

    let confidence = match obj.get("confidence").and_then(Value::as_f64) {
        Some(c) => clamp_confidence(c),
        None => {
            defaulted.confidence = true;
            options.default_confidence
        }
    };

    let (hip, hip_defaulted) = decode_keypoint(obj.get("hip"), confidence);
    let (knee, knee_defaulted) = decode_keypoint(obj.get("knee"), confidence);
    let (ankle, ankle_defaulted) = decode_keypoint(obj.get("ankle"), confidence);
    defaulted.hip = hip_defaulted;
    defaulted.knee = knee_defaulted;
    defaulted.ankle = ankle_defaulted;

    if defaulted.any() {
        tracing::warn!(
            confidence = defaulted.confidence,
            hip = defaulted.hip,
            knee = defaulted.knee,
            ankle = defaulted.ankle,
            "Estimation response incomplete, lenient defaults applied",
        );
    }
    if raw_angle != angle_degrees as f64 {
        tracing::debug!(raw_angle, angle_degrees, "Backend angle rounded or clamped");
    }

    let source = obj
        .get("source")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or(AngleSource::Backend);

    Ok(AngleResult {
        angle_degrees,
        confidence,
        hip,
        knee,
        ankle,
        source,
        defaulted,
    })
}

/// Parse a raw response body and decode it.
pub fn decode_response_str(
    body: &str,
    options: &DecodeOptions,
) -> Result<AngleResult, EstimationError> {
    let payload: Value = serde_json::from_str(body)
        .map_err(|e| EstimationError::MalformedResponse(format!("invalid JSON: {e}")))?;
    decode_response(&payload, options)
}

/// Produce the wire form of a result. Unknown keypoints are omitted.
pub fn encode_result(result: &AngleResult) -> EstimationResponse {
    let point = |k: &Keypoint| {
        k.is_known().then_some(WirePoint {
            x: k.x,
            y: k.y,
            confidence: Some(k.confidence),
        })
    };
    EstimationResponse {
        angle: result.angle_degrees as f64,
        confidence: Some(result.confidence),
        hip: point(&result.hip),
        knee: point(&result.knee),
        ankle: point(&result.ankle),
        source: Some(result.source),
    }
}

/// Returns the keypoint and whether any part of it was defaulted.
///
/// Points without their own confidence inherit the response confidence.
fn decode_keypoint(value: Option<&Value>, response_confidence: f64) -> (Keypoint, bool) {
    let Some(obj) = value.and_then(Value::as_object) else {
        return (Keypoint::UNKNOWN, true);
    };

    let x = obj.get("x").and_then(Value::as_f64);
    let y = obj.get("y").and_then(Value::as_f64);
    if x.is_none() && y.is_none() {
        return (Keypoint::UNKNOWN, true);
    }
    let confidence = obj
        .get("confidence")
        .and_then(Value::as_f64)
        .map_or(response_confidence, clamp_confidence);

    let keypoint = Keypoint::new(x.unwrap_or(0.0), y.unwrap_or(0.0), confidence);
    (keypoint, x.is_none() || y.is_none())
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
