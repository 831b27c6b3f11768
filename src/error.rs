use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::Value;
use thiserror::Error;

use crate::model::ProviderId;
use crate::normalize::{self, GenericError, NormalizedError, RawError};

pub const DEFAULT_SOURCE: &str = "research_gateway_proxy";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsupported provider: {0}")]
pub struct UnsupportedProvider(pub String);

/// Everything the proxy route can fail with. Each variant becomes a JSON
/// `{code, message, source, timestamp}` response; none escape as a panic.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    UnsupportedProvider(#[from] UnsupportedProvider),

    /// Deliberately vague: does not say whether the password or the clock was wrong.
    #[error("Unauthorized: invalid or expired access token")]
    Unauthorized,

    #[error("Unauthorized: no API key supplied for {0}")]
    MissingCallerKey(ProviderId),

    #[error("Server configuration error: No API key configured for {0}")]
    MissingServerKey(ProviderId),

    #[error("Server configuration error: {0}")]
    Configuration(String),

    /// The inbound body could not be read; `status` is 413 when it exceeds
    /// the configured limit, otherwise 400.
    #[error("Failed to read request body: {message}")]
    ReadBody { status: StatusCode, message: String },

    #[error("Failed to reach upstream: {0}")]
    Transport(#[source] reqwest::Error),

    /// Non-success upstream response; `payload` is the augmented error body.
    #[error("Upstream responded with {status}")]
    Upstream { status: StatusCode, payload: Value },
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::UnsupportedProvider(_) => StatusCode::BAD_REQUEST,
            ProxyError::Unauthorized | ProxyError::MissingCallerKey(_) => StatusCode::UNAUTHORIZED,
            ProxyError::MissingServerKey(_) | ProxyError::Configuration(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProxyError::ReadBody { status, .. } => *status,
            ProxyError::Transport(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::Upstream { status, .. } => *status,
        }
    }

    pub fn to_raw(&self) -> RawError {
        match self {
            ProxyError::Transport(e) => RawError::from(e),
            ProxyError::Upstream { status, payload } => {
                RawError::upstream(status.as_u16(), payload.to_string())
            }
            other => RawError::Error(GenericError::new(other.to_string())),
        }
    }

    /// UI copy for this failure, carrying this error's status and `source`.
    pub fn normalized(&self, source: &str) -> NormalizedError {
        normalize::normalize(&self.to_raw())
            .with_status(self.status_code().as_u16())
            .with_source(source)
    }

    /// Renders the failure response. Upstream error bodies keep every
    /// upstream field; a top-level `message` is added only when missing.
    pub fn respond(self, source: &str) -> Response {
        let normalized = self.normalized(source);
        match self {
            ProxyError::Upstream { status, mut payload } => {
                if let Value::Object(map) = &mut payload {
                    map.entry("message")
                        .or_insert_with(|| Value::String(normalized.message.clone()));
                }
                (status, Json(payload)).into_response()
            }
            other => {
                match &other {
                    ProxyError::Transport(e) => tracing::error!(error = %e, source, "Upstream transport failure"),
                    ProxyError::MissingServerKey(_) | ProxyError::Configuration(_) => {
                        tracing::error!(error = %other, source, "Proxy misconfigured")
                    }
                    _ => tracing::warn!(error = %other, source, "Proxy request rejected"),
                }
                normalized.into_response()
            }
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.respond(DEFAULT_SOURCE)
    }
}
