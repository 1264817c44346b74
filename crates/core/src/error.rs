//! Error taxonomy shared by the geometric calculator, keypoint selection,
//! image preparation and the estimation client.
//!
//! Every failure reaching a caller is an [`EstimationError`]. Callers that
//! only need to branch on behaviour (retry, re-authenticate, show a hint)
//! should match on [`EstimationError::kind`] rather than on the variant.

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum EstimationError {
    /// Image missing or undecodable, degenerate keypoints, or the backend
    /// rejected the arguments.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// No leg side cleared the confidence threshold on all three joints.
    #[error("No reliable keypoints: {0}")]
    NoReliableKeypoints(String),

    /// The backend payload is not the expected response shape.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The backend payload has no numeric `angle` field.
    #[error("Response is missing a numeric angle")]
    MissingAngle,

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Caller-visible classification of an [`EstimationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidInput,
    Unauthenticated,
    NoReliableKeypoints,
    RateLimited,
    Timeout,
    Internal,
}

impl EstimationError {
    /// Classification used for caller-side decisions.
    ///
    /// Uninterpretable backend payloads are reported as [`ErrorKind::Internal`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::NoReliableKeypoints(_) => ErrorKind::NoReliableKeypoints,
            Self::MalformedResponse(_) | Self::MissingAngle | Self::Internal(_) => {
                ErrorKind::Internal
            }
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// Short message suitable for showing to the person taking the photo.
    pub fn user_message(&self) -> &'static str {
        match self.kind() {
            ErrorKind::InvalidInput => "That photo could not be used. Please take another one.",
            ErrorKind::Unauthenticated => "Your session has expired. Please sign in again.",
            ErrorKind::NoReliableKeypoints => "Could not detect your leg clearly.",
            ErrorKind::RateLimited => "Too many measurements right now. Please wait a moment.",
            ErrorKind::Timeout => "This took too long. Try again with a clearer, simpler photo.",
            ErrorKind::Internal => "Something went wrong while measuring. Please try again.",
        }
    }
}

impl ErrorKind {
    /// Machine-readable code, e.g. `"RATE_LIMITED"`.
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidInput => "INVALID_INPUT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::NoReliableKeypoints => "NO_RELIABLE_KEYPOINTS",
            Self::RateLimited => "RATE_LIMITED",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }
}
