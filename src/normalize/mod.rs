//! Turns heterogeneous failures into one user-facing message.
//!
//! Providers, transports and the gateway itself all fail in different shapes.
//! [`normalize`] reduces any of them to a [`NormalizedError`]: a single string
//! the UI can show, a status code, and a tag naming the layer that failed.

mod raw;

pub use raw::{ApiCallError, FailureKind, GenericError, RawError, API_CALL_ERROR_NAME};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;

pub const MISSING_CREDENTIALS: &str = "Authentication error: Please check your API key";
pub const INVALID_CREDENTIALS: &str = "Invalid or expired API key. Please check your credentials.";
pub const RATE_LIMITED: &str = "Rate limit exceeded. Please wait a moment and try again.";
pub const UPSTREAM_UNAVAILABLE: &str =
    "The AI provider is temporarily unavailable. Please try again later.";
pub const API_CALL_FAILED: &str = "AI API call failed. Please try again.";
pub const NETWORK_FAILURE: &str = "Network error. Please check your connection.";
pub const CORS_BLOCKED: &str =
    "The browser blocked the request (CORS). Use proxy mode or allow this origin at the provider.";
pub const UNKNOWN_ERROR: &str = "An unknown error occurred";

const NETWORK_MESSAGES: &[&str] = &[
    "NetworkError when attempting to fetch resource.",
    "Failed to fetch",
    "Load failed",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedError {
    pub message: String,
    #[serde(rename = "code")]
    pub status_code: u16,
    pub source: String,
}

impl NormalizedError {
    pub fn new(message: impl Into<String>, status_code: u16, source: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code,
            source: source.into(),
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// The failure body sent to callers: `{code, message, source, timestamp}`.
    pub fn to_body(&self) -> Value {
        json!({
            "code": self.status_code,
            "message": self.message,
            "source": self.source,
            "timestamp": timestamp(),
        })
    }
}

// `source` is a layer tag, not a cause, so `Error::source` keeps its default.
impl fmt::Display for NormalizedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for NormalizedError {}

impl IntoResponse for NormalizedError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_body())).into_response()
    }
}

/// ISO-8601 UTC timestamp with millisecond precision.
pub fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Never fails; anything unrecognised becomes [`UNKNOWN_ERROR`].
pub fn normalize(raw: &RawError) -> NormalizedError {
    match raw {
        RawError::ApiCall(call) => normalize_api_call(call),
        RawError::Error(err) => normalize_generic(err),
        RawError::Text(text) => NormalizedError::new(text.clone(), 500, "client"),
        RawError::Object(value) => normalize_object(value),
        RawError::Normalized(done) => done.clone(),
        RawError::Unknown => NormalizedError::new(UNKNOWN_ERROR, 500, "unknown"),
    }
}

fn normalize_api_call(call: &ApiCallError) -> NormalizedError {
    let status = call.status.unwrap_or(500);
    let upstream = |message: &str, status: u16| NormalizedError::new(message, status, "upstream");

    let mentions_missing_credentials = |s: &str| s.to_ascii_lowercase().contains("no auth credentials");
    if mentions_missing_credentials(&call.message)
        || call.response_body.as_deref().is_some_and(mentions_missing_credentials)
    {
        return upstream(MISSING_CREDENTIALS, 401);
    }

    match status {
        401 => return upstream(INVALID_CREDENTIALS, status),
        429 => return upstream(RATE_LIMITED, status),
        500..=599 if call.status.is_some() => return upstream(UPSTREAM_UNAVAILABLE, status),
        _ => {}
    }

    let payload = call
        .response_body
        .as_deref()
        .and_then(|body| serde_json::from_str::<Value>(body).ok())
        .or_else(|| embedded_json(&call.message));

    if let Some(payload) = payload {
        match documented_code(&payload) {
            Some(Documented::InvalidKey) => return upstream(INVALID_CREDENTIALS, 401),
            Some(Documented::RateLimited) => return upstream(RATE_LIMITED, 429),
            Some(Documented::Overloaded) => return upstream(UPSTREAM_UNAVAILABLE, status),
            None => {}
        }
        if let Some(message) = nested_message(&payload) {
            return upstream(&format!("API Error: {message}"), status);
        }
    }

    if call.message.trim().is_empty() {
        return upstream(API_CALL_FAILED, status);
    }
    upstream(&call.message, status)
}

fn normalize_generic(err: &GenericError) -> NormalizedError {
    let kind = err.kind.or_else(|| {
        if NETWORK_MESSAGES.contains(&err.message.as_str()) {
            Some(FailureKind::Network)
        } else if err.message.contains("CORS") {
            Some(FailureKind::Cors)
        } else {
            None
        }
    });
    match kind {
        Some(FailureKind::Network) => NormalizedError::new(NETWORK_FAILURE, 500, "network"),
        Some(FailureKind::Cors) => NormalizedError::new(CORS_BLOCKED, 500, "network"),
        None if err.message.is_empty() => NormalizedError::new(UNKNOWN_ERROR, 500, "client"),
        None => NormalizedError::new(err.message.clone(), 500, "client"),
    }
}

fn normalize_object(value: &Value) -> NormalizedError {
    let status = ["status", "code", "statusCode"]
        .iter()
        .find_map(|k| value.get(k).and_then(Value::as_u64))
        .and_then(|s| u16::try_from(s).ok())
        .filter(|s| (100..=599).contains(s))
        .unwrap_or(500);

    if let Some(message) = nested_message(value) {
        return NormalizedError::new(message, status, "client");
    }
    if let (Some(code), Some(text)) = (
        value.get("status").and_then(Value::as_u64),
        value.get("statusText").and_then(Value::as_str),
    ) {
        return NormalizedError::new(format!("HTTP {code}: {text}"), status, "client");
    }
    NormalizedError::new(UNKNOWN_ERROR, status, "client")
}

/// `message`, then `error` as a string, then `error.message`.
fn nested_message(value: &Value) -> Option<String> {
    if let Some(message) = value.get("message").and_then(Value::as_str) {
        return Some(message.to_string());
    }
    match value.get("error")? {
        Value::String(s) => Some(s.clone()),
        Value::Object(inner) => inner
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// The outermost `{...}` span inside free text, if it parses.
fn embedded_json(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

enum Documented {
    InvalidKey,
    RateLimited,
    Overloaded,
}

/// Error codes the providers document (OpenAI-style `error.code`,
/// Anthropic-style `error.type`).
fn documented_code(payload: &Value) -> Option<Documented> {
    let error = payload.get("error").unwrap_or(payload);
    let codes = ["code", "type"]
        .iter()
        .filter_map(|k| error.get(k).and_then(Value::as_str));
    for code in codes {
        match code {
            "invalid_api_key" | "authentication_error" => return Some(Documented::InvalidKey),
            "rate_limit_exceeded" | "rate_limit_error" => return Some(Documented::RateLimited),
            "overloaded_error" | "server_error" => return Some(Documented::Overloaded),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_call(message: &str, status: Option<u16>, body: Option<&str>) -> RawError {
        RawError::ApiCall(ApiCallError {
            message: message.to_string(),
            status,
            response_body: body.map(str::to_string),
        })
    }

    #[test]
    fn missing_credentials_wins_over_status() {
        let raw = RawError::upstream(401, r#"{"error":{"message":"No auth credentials found"}}"#);
        let normalized = normalize(&raw);
        assert_eq!(normalized.message, MISSING_CREDENTIALS);
        assert_eq!(normalized.status_code, 401);
        assert!(!normalized.message.contains('{'));
    }

    #[test]
    fn status_codes_map_to_copy() {
        assert_eq!(normalize(&RawError::upstream(401, "nope")).message, INVALID_CREDENTIALS);
        assert_eq!(normalize(&RawError::upstream(429, "")).message, RATE_LIMITED);
        let server = normalize(&RawError::upstream(503, "<html>bad gateway</html>"));
        assert_eq!(server.message, UPSTREAM_UNAVAILABLE);
        assert_eq!(server.status_code, 503);
    }

    #[test]
    fn documented_codes_are_used_when_status_is_generic() {
        let body = r#"{"error":{"type":"authentication_error","message":"invalid x-api-key"}}"#;
        assert_eq!(normalize(&RawError::upstream(400, body)).message, INVALID_CREDENTIALS);
        let body = r#"{"error":{"code":"rate_limit_exceeded","message":"slow"}}"#;
        assert_eq!(normalize(&RawError::upstream(400, body)).message, RATE_LIMITED);
    }

    #[test]
    fn nested_error_message_is_extracted() {
        let raw = RawError::upstream(400, r#"{"error":{"message":"model not found"}}"#);
        let normalized = normalize(&raw);
        assert_eq!(normalized.message, "API Error: model not found");
        assert_eq!(normalized.status_code, 400);
        assert_eq!(normalized.source, "upstream");
    }

    #[test]
    fn json_embedded_in_message_is_extracted() {
        let raw = api_call(
            r#"Bad Request: {"message":"context length exceeded"} (see docs)"#,
            Some(400),
            None,
        );
        assert_eq!(normalize(&raw).message, "API Error: context length exceeded");
    }

    #[test]
    fn api_call_falls_back_to_raw_message() {
        assert_eq!(normalize(&api_call("teapot", Some(418), None)).message, "teapot");
        assert_eq!(normalize(&api_call("", None, None)).message, API_CALL_FAILED);
    }

    #[test]
    fn generic_network_and_cors_messages() {
        let network = normalize(&RawError::Error(GenericError::new(
            "NetworkError when attempting to fetch resource.",
        )));
        assert_eq!(network.message, NETWORK_FAILURE);
        assert_eq!(network.status_code, 500);

        let flagged = normalize(&RawError::Error(GenericError::network("error sending request")));
        assert_eq!(flagged.message, NETWORK_FAILURE);

        let cors = normalize(&RawError::Error(GenericError::new(
            "Access blocked by CORS policy",
        )));
        assert_eq!(cors.message, CORS_BLOCKED);

        let plain = normalize(&RawError::Error(GenericError::new("disk full")));
        assert_eq!(plain.message, "disk full");
    }

    #[test]
    fn strings_are_returned_verbatim() {
        assert_eq!(normalize(&"something broke".into()).message, "something broke");
    }

    #[test]
    fn objects_are_searched_in_order() {
        let msg = |v: Value| normalize(&RawError::Object(v)).message;
        assert_eq!(msg(serde_json::json!({"message": "m", "error": "e"})), "m");
        assert_eq!(msg(serde_json::json!({"error": "e"})), "e");
        assert_eq!(msg(serde_json::json!({"error": {"message": "inner"}})), "inner");
        assert_eq!(
            msg(serde_json::json!({"status": 404, "statusText": "Not Found"})),
            "HTTP 404: Not Found"
        );
        assert_eq!(msg(serde_json::json!({"foo": 1})), UNKNOWN_ERROR);
    }

    #[test]
    fn object_status_is_carried() {
        let normalized =
            normalize(&RawError::Object(serde_json::json!({"status": 404, "statusText": "Not Found"})));
        assert_eq!(normalized.status_code, 404);
    }

    #[test]
    fn unknown_values() {
        assert_eq!(normalize(&RawError::Unknown).message, UNKNOWN_ERROR);
    }

    #[test]
    fn normalizing_twice_keeps_the_message() {
        let cases = vec![
            RawError::upstream(401, r#"{"error":{"message":"No auth credentials found"}}"#),
            RawError::upstream(400, r#"{"error":{"message":"bad"}}"#),
            RawError::upstream(502, "gateway"),
            api_call("plain failure", None, None),
            RawError::Error(GenericError::new("Failed to fetch")),
            RawError::Error(GenericError::new("CORS preflight failed")),
            RawError::Text("text".to_string()),
            RawError::Object(serde_json::json!({"error": {"message": "inner"}})),
            RawError::Unknown,
        ];
        for raw in cases {
            let once = normalize(&raw);
            let twice = normalize(&RawError::Normalized(once.clone()));
            assert_eq!(twice.message, once.message);
            assert_eq!(twice, once);
            let via_text = normalize(&RawError::Text(once.message.clone()));
            assert_eq!(via_text.message, once.message);
        }
    }

    #[test]
    fn displays_as_its_message_and_has_no_cause() {
        use std::error::Error;
        let err = NormalizedError::new("Rate limited", 429, "openrouter_server_proxy");
        assert_eq!(err.to_string(), "Rate limited");
        assert!(err.source().is_none());
        let boxed: Box<dyn Error + Send + Sync> = Box::new(err);
        assert_eq!(boxed.to_string(), "Rate limited");
    }

    #[test]
    fn body_has_the_wire_shape() {
        let body = NormalizedError::new("m", 500, "openrouter_server_proxy").to_body();
        assert_eq!(body["code"], 500);
        assert_eq!(body["message"], "m");
        assert_eq!(body["source"], "openrouter_server_proxy");
        let ts = body["timestamp"].as_str().unwrap();
        assert!(chrono::DateTime::parse_from_rfc3339(ts).is_ok());
    }
}
