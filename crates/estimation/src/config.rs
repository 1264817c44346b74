//! Estimation client configuration loaded from environment variables.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use kneeflex_core::image_prep::{ImagePolicy, DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};
use kneeflex_core::measurement::StaticIdentity;
use kneeflex_core::selection::{validate_threshold, DEFAULT_KEYPOINT_THRESHOLD};

use crate::api::CallableApi;
use crate::backend::HttpEstimationBackend;
use crate::client::AngleEstimationClient;
use crate::estimator::AngleEstimator;
use crate::pose::{PoseDetector, PoseEstimator};
use crate::wire::{DecodeOptions, DEFAULT_CONFIDENCE};

/// Default callable function name.
pub const DEFAULT_FUNCTION_NAME: &str = "estimateKneeAngle";

/// Default request timeout. The backend may reason for a minute or more.
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Configuration for the estimation client.
#[derive(Debug, Clone)]
pub struct EstimationConfig {
    /// Base URL the callable function is hosted under.
    pub api_url: String,
    pub function_name: String,
    /// Pre-issued identity token; anonymous when absent.
    pub id_token: Option<String>,
    pub request_timeout_secs: u64,
    pub image: ImagePolicy,
    /// Confidence reported when the backend omits one.
    pub default_confidence: f64,
    /// Minimum per-joint confidence for the on-device path.
    pub keypoint_threshold: f64,
}

/// Errors raised while loading or applying configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),
}

impl EstimationConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default             |
    /// |---------------------------|---------------------|
    /// | `ESTIMATION_API_URL`      | required            |
    /// | `ESTIMATION_FUNCTION`     | `estimateKneeAngle` |
    /// | `ESTIMATION_ID_TOKEN`     | unset               |
    /// | `ESTIMATION_TIMEOUT_SECS` | `120`               |
    /// | `IMAGE_MAX_DIMENSION`     | `1024`              |
    /// | `IMAGE_JPEG_QUALITY`      | `80`                |
    /// | `DEFAULT_CONFIDENCE`      | `0.8`               |
    /// | `KEYPOINT_THRESHOLD`      | `0.3`               |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup` instead of the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = lookup("ESTIMATION_API_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("ESTIMATION_API_URL"))?;

        let function_name = lookup("ESTIMATION_FUNCTION")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_FUNCTION_NAME.to_string());

        let id_token = lookup("ESTIMATION_ID_TOKEN").filter(|v| !v.trim().is_empty());

        let config = Self {
            api_url,
            function_name,
            id_token,
            request_timeout_secs: parse_or(&lookup, "ESTIMATION_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?,
            image: ImagePolicy {
                max_dimension: parse_or(&lookup, "IMAGE_MAX_DIMENSION", DEFAULT_MAX_DIMENSION)?,
                jpeg_quality: parse_or(&lookup, "IMAGE_JPEG_QUALITY", DEFAULT_JPEG_QUALITY)?,
            },
            default_confidence: parse_or(&lookup, "DEFAULT_CONFIDENCE", DEFAULT_CONFIDENCE)?,
            keypoint_threshold: parse_or(
                &lookup,
                "KEYPOINT_THRESHOLD",
                DEFAULT_KEYPOINT_THRESHOLD,
            )?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check ranges that parsing alone does not enforce.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.api_url.starts_with("http://") && !self.api_url.starts_with("https://") {
            return Err(invalid("ESTIMATION_API_URL", &self.api_url, "must be an http(s) URL"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("ESTIMATION_TIMEOUT_SECS", "0", "must be greater than 0"));
        }
        self.image
            .validate()
            .map_err(|e| invalid("IMAGE_*", &format!("{:?}", self.image), &e.to_string()))?;
        self.decode_options()
            .validate()
            .map_err(|e| invalid("DEFAULT_CONFIDENCE", &self.default_confidence.to_string(), &e.to_string()))?;
        validate_threshold(self.keypoint_threshold).map_err(|e| {
            invalid("KEYPOINT_THRESHOLD", &self.keypoint_threshold.to_string(), &e.to_string())
        })?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn decode_options(&self) -> DecodeOptions {
        DecodeOptions {
            default_confidence: self.default_confidence,
        }
    }

    /// Build the HTTP-backed client described by this configuration.
    pub fn build_client(&self) -> Result<AngleEstimationClient, ConfigError> {
        let api = CallableApi::new(&self.api_url, &self.function_name, self.request_timeout())
            .map_err(|e| ConfigError::Client(e.to_string()))?;
        let identity = Arc::new(StaticIdentity::new(self.id_token.clone()));
        let backend = Arc::new(HttpEstimationBackend::new(api, identity));

        Ok(AngleEstimationClient::new(backend)
            .with_image_policy(self.image)
            .with_decode_options(self.decode_options()))
    }

    /// Build the network estimator, with an on-device fallback when a pose
    /// detector is available.
    pub fn build_estimator(
        &self,
        detector: Option<Arc<dyn PoseDetector>>,
    ) -> Result<AngleEstimator, ConfigError> {
        let estimator = AngleEstimator::new(self.build_client()?);
        let Some(detector) = detector else {
            return Ok(estimator);
        };

        let fallback = PoseEstimator::new(detector)
            .with_image_policy(self.image)
            .with_threshold(self.keypoint_threshold)
            .map_err(|e| {
                invalid("KEYPOINT_THRESHOLD", &self.keypoint_threshold.to_string(), &e.to_string())
            })?;
        Ok(estimator.with_fallback(fallback))
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, &raw, &e.to_string())),
        _ => Ok(default),
    }
}

fn invalid(var: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        var,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
