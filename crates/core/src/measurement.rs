//! Measurement records and the collaborator interfaces around estimation.
//!
//! Persistence and identity live outside this workspace's core; only their
//! contracts are defined here so they can be injected (and faked in tests).

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::EstimationError;
use crate::recovery::post_op_week;
use crate::types::{AngleResult, AngleSource, RecordId, Timestamp};

/// Classification chosen by the caller when saving a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementKind {
    /// Straightening; 0° is fully straight.
    Extension,
    /// Bending; larger is more bent.
    Flexion,
}

impl MeasurementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Flexion => "flexion",
        }
    }

    pub fn from_name(name: &str) -> Result<Self, EstimationError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "extension" => Ok(Self::Extension),
            "flexion" => Ok(Self::Flexion),
            other => Err(EstimationError::InvalidInput(format!(
                "Unknown measurement kind '{other}'. Must be one of: extension, flexion"
            ))),
        }
    }
}

/// One stored measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    pub id: RecordId,
    pub kind: MeasurementKind,
    pub angle_degrees: i32,
    pub confidence: f64,
    pub source: AngleSource,
    pub measured_at: Timestamp,
    /// Whole weeks since surgery, when the surgery date is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_op_week: Option<u32>,
    /// Location of the source photo, when the caller kept it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_path: Option<String>,
}

impl MeasurementRecord {
    /// Build a record from an estimation result, stamping a fresh UUID v7.
    pub fn from_result(
        result: &AngleResult,
        kind: MeasurementKind,
        measured_at: Timestamp,
        surgery_date: Option<NaiveDate>,
    ) -> Self {
        Self {
            id: uuid::Uuid::now_v7(),
            kind,
            angle_degrees: result.angle_degrees,
            confidence: result.confidence,
            source: result.source,
            measured_at,
            post_op_week: surgery_date
                .and_then(|surgery| post_op_week(surgery, measured_at.date_naive())),
            photo_path: None,
        }
    }

    pub fn with_photo_path(mut self, path: impl Into<String>) -> Self {
        self.photo_path = Some(path.into());
        self
    }
}

/// Stores measurement records and returns their identifier.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    async fn save(&self, record: &MeasurementRecord) -> Result<RecordId, EstimationError>;
}

/// Yields the caller's identity token, if signed in.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn id_token(&self) -> Result<Option<String>, EstimationError>;
}

/// Identity provider backed by a fixed, pre-issued token.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    token: Option<String>,
}

impl StaticIdentity {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self { token: None }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn id_token(&self) -> Result<Option<String>, EstimationError> {
        Ok(self.token.clone())
    }
}
