use serde_json::Value;

use super::NormalizedError;

/// Marker name the AI SDKs give to failed provider calls.
pub const API_CALL_ERROR_NAME: &str = "AI_APICallError";

/// A failure as first observed, before it is turned into UI copy.
#[derive(Debug, Clone)]
pub enum RawError {
    /// A provider call that came back with an error.
    ApiCall(ApiCallError),
    /// An error object with a message, e.g. a transport failure.
    Error(GenericError),
    /// A bare string.
    Text(String),
    /// A plain JSON value with no recognised marker.
    Object(Value),
    /// Already normalized; passes through unchanged.
    Normalized(NormalizedError),
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct ApiCallError {
    pub message: String,
    pub status: Option<u16>,
    pub response_body: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Network,
    Cors,
}

#[derive(Debug, Clone)]
pub struct GenericError {
    pub message: String,
    /// Set when the producer knows the failure class; otherwise the
    /// message text is inspected.
    pub kind: Option<FailureKind>,
}

impl GenericError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: None,
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: Some(FailureKind::Network),
        }
    }
}

impl RawError {
    /// Builds the error for a non-success upstream response.
    pub fn upstream(status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        RawError::ApiCall(ApiCallError {
            message: format!("HTTP {status}: {body}"),
            status: Some(status),
            response_body: Some(body),
        })
    }

    /// Classifies an arbitrary JSON value. Objects named
    /// [`API_CALL_ERROR_NAME`] are treated as provider call failures.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => RawError::Text(s),
            Value::Object(ref map)
                if map.get("name").and_then(Value::as_str) == Some(API_CALL_ERROR_NAME) =>
            {
                let message = map
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string();
                let status = map
                    .get("statusCode")
                    .and_then(Value::as_u64)
                    .and_then(|s| u16::try_from(s).ok());
                let response_body = map.get("responseBody").map(|b| match b {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
                RawError::ApiCall(ApiCallError {
                    message,
                    status,
                    response_body,
                })
            }
            Value::Object(_) => RawError::Object(value),
            _ => RawError::Unknown,
        }
    }
}

impl From<&str> for RawError {
    fn from(s: &str) -> Self {
        RawError::Text(s.to_string())
    }
}

impl From<String> for RawError {
    fn from(s: String) -> Self {
        RawError::Text(s)
    }
}

impl From<NormalizedError> for RawError {
    fn from(e: NormalizedError) -> Self {
        RawError::Normalized(e)
    }
}

impl From<&reqwest::Error> for RawError {
    fn from(e: &reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return RawError::ApiCall(ApiCallError {
                message: e.to_string(),
                status: Some(status.as_u16()),
                response_body: None,
            });
        }
        if e.is_connect() || e.is_timeout() || e.is_request() {
            return RawError::Error(GenericError::network(e.to_string()));
        }
        RawError::Error(GenericError::new(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn api_call_marker_is_recognised() {
        let raw = RawError::from_value(json!({
            "name": "AI_APICallError",
            "message": "Unauthorized",
            "statusCode": 401,
            "responseBody": "{\"error\":{\"message\":\"bad key\"}}"
        }));
        match raw {
            RawError::ApiCall(call) => {
                assert_eq!(call.status, Some(401));
                assert_eq!(call.message, "Unauthorized");
                assert!(call.response_body.unwrap().contains("bad key"));
            }
            other => panic!("expected ApiCall, got {other:?}"),
        }
    }

    #[test]
    fn plain_values_are_classified() {
        assert!(matches!(RawError::from_value(json!("boom")), RawError::Text(s) if s == "boom"));
        assert!(matches!(RawError::from_value(json!({"message": "x"})), RawError::Object(_)));
        assert!(matches!(RawError::from_value(json!(42)), RawError::Unknown));
        assert!(matches!(RawError::from_value(Value::Null), RawError::Unknown));
    }

    #[test]
    fn upstream_helper_keeps_status_and_body() {
        match RawError::upstream(429, "slow down") {
            RawError::ApiCall(call) => {
                assert_eq!(call.status, Some(429));
                assert_eq!(call.response_body.as_deref(), Some("slow down"));
            }
            other => panic!("expected ApiCall, got {other:?}"),
        }
    }
}
