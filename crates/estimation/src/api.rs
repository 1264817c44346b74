//! HTTP client for a hosted callable function.
//!
//! Callable functions take `POST {base_url}/{function}` with a
//! `{"data": ...}` body and an optional bearer identity token, and answer
//! either `{"result": ...}` or `{"error": {"status": ..., "message": ...}}`.
//! [`CallableApi`] handles the envelope; [`classify_backend_error`] maps
//! failures onto the estimation error taxonomy.

use std::time::Duration;

use serde_json::Value;

use kneeflex_core::error::EstimationError;

/// HTTP client for a single callable function.
pub struct CallableApi {
    client: reqwest::Client,
    base_url: String,
    function_name: String,
}

/// Errors from the callable transport layer.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The function answered with an error envelope.
    #[error("Function error ({}): {message}", .status.as_deref().unwrap_or("unknown"))]
    Function {
        /// Machine-readable status, e.g. `RESOURCE_EXHAUSTED`.
        status: Option<String>,
        message: String,
        /// HTTP status code of the response.
        http_status: u16,
    },

    /// Non-2xx response without a usable error envelope.
    #[error("Backend returned HTTP {status}: {body}")]
    Status {
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// 2xx response whose body is not JSON.
    #[error("Unreadable response body: {0}")]
    Body(String),
}

impl CallableApi {
    /// Create a client with its own connection pool and request timeout.
    ///
    /// * `base_url`      - e.g. `https://region-project.cloudfunctions.net`.
    /// * `function_name` - e.g. `estimateKneeAngle`.
    pub fn new(
        base_url: impl Into<String>,
        function_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url, function_name))
    }

    /// Reuse an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        base_url: impl Into<String>,
        function_name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            function_name: function_name.into(),
        }
    }

    /// Full URL the function is invoked at.
    pub fn function_url(&self) -> String {
        format!("{}/{}", self.base_url, self.function_name)
    }

    /// Invoke the function with `data`, returning the unwrapped `result`.
    ///
    /// A success body without a `result` key is returned as-is.
    pub async fn call(&self, data: &Value, id_token: Option<&str>) -> Result<Value, BackendError> {
        let body = serde_json::json!({ "data": data });

        let mut request = self.client.post(self.function_url()).json(&body);
        if let Some(token) = id_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        tracing::debug!(
            function = %self.function_name,
            status = status.as_u16(),
            response_bytes = text.len(),
            "Callable function responded",
        );

        Self::unwrap_envelope(status, &text)
    }

    // ---- private helpers ----

    fn unwrap_envelope(status: reqwest::StatusCode, text: &str) -> Result<Value, BackendError> {
        let parsed: Option<Value> = serde_json::from_str(text).ok();

        if let Some(error) = parsed.as_ref().and_then(|body| body.get("error")) {
            return Err(Self::function_error(error, status));
        }

        if !status.is_success() {
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: text.to_string(),
            });
        }

        match parsed {
            Some(Value::Object(mut obj)) if obj.contains_key("result") => {
                Ok(obj.remove("result").unwrap_or(Value::Null))
            }
            Some(other) => Ok(other),
            None => Err(BackendError::Body(truncate(text, 200))),
        }
    }

    fn function_error(error: &Value, status: reqwest::StatusCode) -> BackendError {
        let (code, message) = match error {
            Value::Object(obj) => (
                obj.get("status").and_then(Value::as_str).map(str::to_string),
                obj.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("no message")
                    .to_string(),
            ),
            Value::String(message) => (None, message.clone()),
            other => (None, other.to_string()),
        };
        BackendError::Function {
            status: code,
            message,
            http_status: status.as_u16(),
        }
    }
}

/// Map a transport failure onto the estimation error taxonomy.
pub fn classify_backend_error(err: BackendError) -> EstimationError {
    match err {
        BackendError::Request(e) if e.is_timeout() => {
            EstimationError::Timeout(format!("request timed out: {e}"))
        }
        BackendError::Request(e) => EstimationError::Internal(format!("request failed: {e}")),
        BackendError::Function {
            status: Some(code),
            message,
            ..
        } => classify_status_name(&code, message),
        BackendError::Function {
            status: None,
            message,
            http_status,
        } => classify_http_status(http_status, message),
        BackendError::Status { status, body } => classify_http_status(status, truncate(&body, 200)),
        BackendError::Body(msg) => EstimationError::MalformedResponse(msg),
    }
}

impl From<BackendError> for EstimationError {
    fn from(err: BackendError) -> Self {
        classify_backend_error(err)
    }
}

/// Map a function status name (`RESOURCE_EXHAUSTED`, `resource-exhausted`).
fn classify_status_name(code: &str, message: String) -> EstimationError {
    match code.trim().to_ascii_lowercase().replace('_', "-").as_str() {
        "unauthenticated" => EstimationError::Unauthenticated(message),
        "invalid-argument" => EstimationError::InvalidInput(message),
        "resource-exhausted" => EstimationError::RateLimited(message),
        "deadline-exceeded" => EstimationError::Timeout(message),
        _ => EstimationError::Internal(format!("{code}: {message}")),
    }
}

fn classify_http_status(status: u16, message: String) -> EstimationError {
    match status {
        400 => EstimationError::InvalidInput(message),
        401 => EstimationError::Unauthenticated(message),
        429 => EstimationError::RateLimited(message),
        408 | 504 => EstimationError::Timeout(message),
        _ => EstimationError::Internal(format!("HTTP {status}: {message}")),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push_str("...");
        out
    }
}
