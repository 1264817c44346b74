//! The estimation backend seam.
//!
//! [`EstimationBackend`] returns the raw response payload; validation is
//! left to [`decode_response`](crate::wire::decode_response) so it happens
//! in exactly one place regardless of transport.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use kneeflex_core::error::EstimationError;
use kneeflex_core::measurement::IdentityProvider;

use crate::api::CallableApi;
use crate::wire::EstimationRequest;

/// A stateless handler that turns an image request into an angle payload.
#[async_trait]
pub trait EstimationBackend: Send + Sync {
    async fn estimate_angle(&self, request: &EstimationRequest) -> Result<Value, EstimationError>;
}

/// Backend reached over HTTP as a hosted callable function.
pub struct HttpEstimationBackend {
    api: CallableApi,
    identity: Arc<dyn IdentityProvider>,
}

impl HttpEstimationBackend {
    pub fn new(api: CallableApi, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { api, identity }
    }

    pub fn api(&self) -> &CallableApi {
        &self.api
    }
}

#[async_trait]
impl EstimationBackend for HttpEstimationBackend {
    async fn estimate_angle(&self, request: &EstimationRequest) -> Result<Value, EstimationError> {
        let token = self.identity.id_token().await?;
        if token.is_none() {
            tracing::debug!("No identity token available, calling backend anonymously");
        }

        let data = serde_json::to_value(request)
            .map_err(|e| EstimationError::Internal(format!("request serialization failed: {e}")))?;

        Ok(self.api.call(&data, token.as_deref()).await?)
    }
}
