use crate::config::ServerConfig;
use crate::error::{ProxyError, DEFAULT_SOURCE};
use crate::model::{AuthStyle, DeploymentMode, ProviderId};
use crate::normalize;
use crate::registry::{provider, RequestContext, PROXY_ROUTE_PREFIX};
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, FromRequest, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get},
    Json, Router,
};
use serde::de::IgnoredAny;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

/// Query parameter some front-ends use to carry the captured path. Never forwarded.
pub const PATH_CAPTURE_PARAM: &str = "slug";

/// Inbound headers copied upstream for every provider.
pub const HEADERS_TO_COPY: [&str; 3] = ["accept", "accept-encoding", "user-agent"];

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            http: reqwest::Client::new(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route(&format!("{PROXY_ROUTE_PREFIX}/*route"), any(handle_proxy))
        .route("/api/debug", get(handle_debug))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// `"openrouter/api/v1/chat"` → `("openrouter", "api/v1/chat")`.
fn split_route(route: &str) -> (&str, &str) {
    let route = route.trim_start_matches('/');
    route.split_once('/').unwrap_or((route, ""))
}

pub fn source_tag(provider: &str) -> String {
    match provider.parse::<ProviderId>() {
        Ok(id) => format!("{id}_server_proxy"),
        Err(_) => DEFAULT_SOURCE.to_string(),
    }
}

pub async fn handle_proxy(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let route = req
        .uri()
        .path()
        .strip_prefix(PROXY_ROUTE_PREFIX)
        .unwrap_or_default()
        .to_string();
    let (provider_segment, upstream_path) = split_route(&route);
    let source = source_tag(provider_segment);

    match proxy(&state, req, provider_segment, upstream_path, &source).await {
        Ok(response) => response,
        Err(err) => err.respond(&source),
    }
}

/// Inbound body as forwarded upstream. JSON is validated but never
/// re-serialized, so numbers wider than 64 bits survive unchanged.
#[derive(Debug)]
enum Payload {
    Empty,
    Json(Bytes),
    /// Not JSON; forwarded byte for byte.
    Raw(Bytes),
}

#[derive(Deserialize)]
struct ModelHint {
    model: Option<String>,
}

impl Payload {
    fn from_bytes(bytes: Bytes) -> Self {
        if bytes.is_empty() {
            return Payload::Empty;
        }
        match serde_json::from_slice::<IgnoredAny>(&bytes) {
            Ok(_) => Payload::Json(bytes),
            Err(_) => Payload::Raw(bytes),
        }
    }

    fn model(&self) -> Option<String> {
        match self {
            Payload::Json(bytes) => serde_json::from_slice::<ModelHint>(bytes).ok()?.model,
            _ => None,
        }
    }

    fn into_body(self) -> Option<reqwest::Body> {
        match self {
            Payload::Empty => None,
            Payload::Json(bytes) | Payload::Raw(bytes) => Some(bytes.into()),
        }
    }
}

async fn proxy(
    state: &AppState,
    req: Request,
    provider_segment: &str,
    upstream_path: &str,
    source: &str,
) -> Result<Response, ProxyError> {
    let config = &state.config;

    // Received
    let id: ProviderId = provider_segment.parse()?;
    let provider = provider(id);
    let method = req.method().clone();
    let query = strip_capture_params(req.uri().query());
    let inbound_headers = req.headers().clone();
    let payload = if method == Method::GET {
        Payload::Empty
    } else {
        let bytes = Bytes::from_request(req, &()).await.map_err(|rejection| {
            ProxyError::ReadBody {
                status: rejection.status(),
                message: rejection.body_text(),
            }
        })?;
        Payload::from_bytes(bytes)
    };
    if let Some(model) = payload.model() {
        debug!(provider = %id, model = %model, "Model requested");
    }

    // Authenticated
    let style = provider.config().auth_style;
    let presented = inbound_credential(&inbound_headers, style);
    let api_key = match config.mode {
        DeploymentMode::Proxy => {
            let now = chrono::Utc::now().timestamp_millis();
            let verified = config.verifier().verify(
                presented.as_deref().unwrap_or_default(),
                &config.access_password,
                now,
            );
            if !verified {
                return Err(ProxyError::Unauthorized);
            }
            if provider.requires_key() {
                Some(
                    config
                        .api_key(id)
                        .ok_or(ProxyError::MissingServerKey(id))?
                        .to_string(),
                )
            } else {
                None
            }
        }
        DeploymentMode::Local => {
            if provider.requires_key() {
                Some(presented.ok_or(ProxyError::MissingCallerKey(id))?)
            } else {
                None
            }
        }
    };

    // Forwarding
    let url = upstream_url(config.base_url(id), upstream_path, query.as_deref())
        .map_err(|e| ProxyError::Configuration(format!("invalid upstream URL for {id}: {e}")))?;
    let ctx = request_context(&inbound_headers, config);
    let headers = upstream_headers(&inbound_headers, id, api_key.as_deref(), &ctx)?;

    info!(provider = %id, method = %method, url = %redact_query(&url), "Forwarding to upstream");

    let mut request = state.http.request(method, url).headers(headers);
    if let Some(body) = payload.into_body() {
        request = request.body(body);
    }
    let started = Instant::now();
    let upstream = request.send().await.map_err(ProxyError::Transport)?;
    let status = upstream.status();
    info!(provider = %id, status = status.as_u16(), elapsed = ?started.elapsed(), "Upstream responded");

    // Relaying
    if !status.is_success() {
        let text = upstream.text().await.map_err(ProxyError::Transport)?;
        warn!(provider = %id, status = status.as_u16(), "Upstream returned an error");
        return Err(ProxyError::Upstream {
            status,
            payload: upstream_error_payload(status, &text, source),
        });
    }

    let mut headers = upstream.headers().clone();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

/// Removes the path-capture parameter and re-serializes the rest.
pub fn strip_capture_params(query: Option<&str>) -> Option<String> {
    let query = query.filter(|q| !q.is_empty())?;
    let pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .filter(|(k, _)| k.as_str() != PATH_CAPTURE_PARAM)
        .collect();
    if pairs.is_empty() {
        return None;
    }
    Some(
        form_urlencoded::Serializer::new(String::new())
            .extend_pairs(pairs)
            .finish(),
    )
}

/// Base URL + the once-decoded path + query.
pub fn upstream_url(base: &str, raw_path: &str, query: Option<&str>) -> Result<Url, url::ParseError> {
    let decoded = urlencoding::decode_binary(raw_path.as_bytes());
    let path = String::from_utf8_lossy(&decoded);
    let path = path.trim_start_matches('/');

    let mut url = base.trim_end_matches('/').to_string();
    if !path.is_empty() {
        url.push('/');
        url.push_str(path);
    }
    if let Some(query) = query {
        url.push('?');
        url.push_str(query);
    }
    Url::parse(&url)
}

fn redact_query(url: &Url) -> &str {
    let s = url.as_str();
    s.split_once('?').map(|(head, _)| head).unwrap_or(s)
}

/// The credential a caller presented: the provider's own auth header
/// first, then `Authorization: Bearer`.
pub fn inbound_credential(headers: &HeaderMap, style: AuthStyle) -> Option<String> {
    let non_empty = |v: &str| Some(v.trim()).filter(|v| !v.is_empty()).map(str::to_string);

    if let AuthStyle::Header(name) = style {
        if let Some(value) = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(non_empty)
        {
            return Some(value);
        }
    }
    let authorization = headers.get(header::AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = authorization.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    non_empty(token)
}

fn request_context(headers: &HeaderMap, config: &ServerConfig) -> RequestContext {
    let host = headers.get(header::HOST).and_then(|h| h.to_str().ok());
    let mut ctx = RequestContext::from_host(host);
    if ctx.referer.is_none() {
        ctx.referer = config.public_url.clone();
    }
    ctx
}

/// Content type, credential, allowlisted inbound headers, then provider
/// headers. Later entries win.
fn upstream_headers(
    inbound: &HeaderMap,
    id: ProviderId,
    api_key: Option<&str>,
    ctx: &RequestContext,
) -> Result<HeaderMap, ProxyError> {
    let provider = provider(id);
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

    if let Some((name, value)) = api_key.and_then(|key| provider.config().auth_style.header_for(key)) {
        let value = HeaderValue::from_str(&value).map_err(|_| {
            ProxyError::Configuration(format!("API key for {id} is not a valid header value"))
        })?;
        headers.insert(HeaderName::from_static(name), value);
    }

    for name in HEADERS_TO_COPY.iter().chain(provider.forwarded_headers()) {
        if let Some(value) = inbound.get(*name) {
            headers.insert(HeaderName::from_static(*name), value.clone());
        }
    }

    for (name, value) in provider.request_headers(ctx) {
        let name = HeaderName::try_from(name.as_str())
            .map_err(|e| ProxyError::Configuration(format!("bad header name `{name}`: {e}")))?;
        let value = HeaderValue::from_str(&value)
            .map_err(|e| ProxyError::Configuration(format!("bad value for `{name}`: {e}")))?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Error body for a failed upstream call. JSON objects keep their fields;
/// anything else is wrapped as `message`.
pub fn upstream_error_payload(status: StatusCode, text: &str, source: &str) -> Value {
    let timestamp = normalize::timestamp();
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(mut map)) => {
            map.entry("code").or_insert_with(|| json!(status.as_u16()));
            map.insert("status".to_string(), json!(status.as_u16()));
            map.insert("source".to_string(), json!(source));
            map.insert("timestamp".to_string(), json!(timestamp));
            Value::Object(map)
        }
        _ => json!({
            "code": status.as_u16(),
            "message": text,
            "source": source,
            "timestamp": timestamp,
        }),
    }
}

pub async fn handle_debug(State(state): State<Arc<AppState>>, headers: HeaderMap) -> impl IntoResponse {
    let config = &state.config;
    let masked = |set: bool| if set { "***set***" } else { "not set" };

    let mut environment = Map::new();
    environment.insert("VERSION".into(), json!(env!("CARGO_PKG_VERSION")));
    environment.insert("DEPLOYMENT_MODE".into(), json!(config.mode.as_str()));
    environment.insert(
        "ACCESS_PASSWORD".into(),
        json!(masked(!config.access_password.is_empty())),
    );
    environment.insert(
        "PUBLIC_URL".into(),
        json!(config.public_url.as_deref().unwrap_or("not set")),
    );
    for id in ProviderId::ALL {
        let prefix = provider(id).config().env_prefix;
        environment.insert(
            format!("{prefix}_API_KEY"),
            json!(masked(config.api_key(id).is_some())),
        );
        environment.insert(
            format!("{prefix}_API_BASE_URL"),
            json!(config.base_url_override(id).unwrap_or("not set")),
        );
    }

    let visible_headers: Map<String, Value> = headers
        .iter()
        .filter(|(name, _)| {
            let name = name.as_str();
            !name.contains("auth") && !name.contains("cookie") && !name.contains("api-key")
        })
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), json!(v)))
        })
        .collect();

    Json(json!({
        "message": "Debug information",
        "timestamp": normalize::timestamp(),
        "environment": environment,
        "headers": visible_headers,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_split_into_provider_and_path() {
        assert_eq!(
            split_route("/openrouter/api/v1/chat/completions"),
            ("openrouter", "api/v1/chat/completions")
        );
        assert_eq!(split_route("/ollama"), ("ollama", ""));
        assert_eq!(split_route(""), ("", ""));
    }

    #[test]
    fn capture_param_is_stripped() {
        assert_eq!(strip_capture_params(None), None);
        assert_eq!(strip_capture_params(Some("")), None);
        assert_eq!(strip_capture_params(Some("slug=a&slug=b")), None);
        assert_eq!(
            strip_capture_params(Some("slug=v1&alt=sse&key=a%2Fb")),
            Some("alt=sse&key=a%2Fb".to_string())
        );
        assert_eq!(strip_capture_params(Some("alt=sse")), Some("alt=sse".to_string()));
    }

    #[test]
    fn upstream_url_decodes_the_path_once() {
        let url = upstream_url(
            "https://generativelanguage.googleapis.com/",
            "v1beta/models/gemini-pro%3AstreamGenerateContent",
            Some("alt=sse"),
        )
        .unwrap();
        assert_eq!(
            url.as_str(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-pro:streamGenerateContent?alt=sse"
        );

        // %2541 decodes once to %41, not to `A`.
        let url = upstream_url("https://a.io", "x%2541", None).unwrap();
        assert_eq!(url.as_str(), "https://a.io/x%41");
    }

    #[test]
    fn upstream_url_without_path() {
        let url = upstream_url("http://localhost:11434", "", None).unwrap();
        assert_eq!(url.as_str(), "http://localhost:11434/");
    }

    #[test]
    fn malformed_base_url_is_an_error() {
        assert!(upstream_url("not a url", "v1", None).is_err());
    }

    #[test]
    fn credential_from_provider_header_then_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("x-goog-api-key", HeaderValue::from_static("sig-g"));
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer sig-b"));
        assert_eq!(
            inbound_credential(&headers, AuthStyle::Header("x-goog-api-key")).as_deref(),
            Some("sig-g")
        );
        assert_eq!(inbound_credential(&headers, AuthStyle::Bearer).as_deref(), Some("sig-b"));
        assert_eq!(inbound_credential(&headers, AuthStyle::None).as_deref(), Some("sig-b"));

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(inbound_credential(&basic, AuthStyle::Bearer), None);
        assert_eq!(inbound_credential(&HeaderMap::new(), AuthStyle::Bearer), None);
    }

    #[test]
    fn upstream_headers_merge_in_order() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::USER_AGENT, HeaderValue::from_static("ai-sdk"));
        inbound.insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer signature"));
        inbound.insert(header::COOKIE, HeaderValue::from_static("session=1"));
        let ctx = RequestContext::from_host(Some("research.example.com"));

        let headers = upstream_headers(&inbound, ProviderId::OpenRouter, Some("sk-or"), &ctx).unwrap();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::AUTHORIZATION], "Bearer sk-or");
        assert_eq!(headers[header::USER_AGENT], "ai-sdk");
        assert_eq!(headers[header::ACCEPT], "text/event-stream");
        assert_eq!(headers["http-referer"], "https://research.example.com/");
        assert_eq!(headers["x-title"], "Deep Research");
        assert!(headers.get(header::COOKIE).is_none());
    }

    #[test]
    fn anthropic_headers_use_x_api_key() {
        let mut inbound = HeaderMap::new();
        inbound.insert("anthropic-beta", HeaderValue::from_static("tools-2024"));
        let headers =
            upstream_headers(&inbound, ProviderId::Anthropic, Some("sk-ant"), &RequestContext::default())
                .unwrap();
        assert_eq!(headers["x-api-key"], "sk-ant");
        assert_eq!(headers["anthropic-version"], crate::registry::ANTHROPIC_VERSION);
        assert_eq!(headers["anthropic-beta"], "tools-2024");
        assert!(headers.get(header::AUTHORIZATION).is_none());
    }

    #[test]
    fn error_payload_augments_json() {
        let payload = upstream_error_payload(
            StatusCode::UNAUTHORIZED,
            r#"{"error":{"message":"No auth credentials found","code":401}}"#,
            "openrouter_server_proxy",
        );
        assert_eq!(payload["error"]["message"], "No auth credentials found");
        assert_eq!(payload["code"], 401);
        assert_eq!(payload["source"], "openrouter_server_proxy");
        assert!(payload["timestamp"].is_string());
    }

    #[test]
    fn error_payload_wraps_text() {
        let payload = upstream_error_payload(StatusCode::BAD_GATEWAY, "upstream down", "t");
        assert_eq!(payload["code"], 502);
        assert_eq!(payload["message"], "upstream down");
        assert_eq!(payload["source"], "t");
    }

    #[test]
    fn payload_classification() {
        assert!(matches!(Payload::from_bytes(Bytes::new()), Payload::Empty));
        assert!(matches!(Payload::from_bytes(Bytes::from_static(b"{\"a\":1}")), Payload::Json(_)));
        assert!(matches!(Payload::from_bytes(Bytes::from_static(b"a=1&b=2")), Payload::Raw(_)));
    }

    #[test]
    fn json_payload_is_forwarded_byte_for_byte() {
        let raw: &'static [u8] = br#"{"seed":123456789012345678901234567890, "n":1.50,"model":"m"}"#;
        let payload = Payload::from_bytes(Bytes::from_static(raw));
        assert!(matches!(payload, Payload::Json(_)));
        assert_eq!(payload.model().as_deref(), Some("m"));
        let body = payload.into_body().unwrap();
        assert_eq!(body.as_bytes(), Some(raw));
    }

    #[test]
    fn model_hint_tolerates_other_shapes() {
        assert_eq!(Payload::from_bytes(Bytes::from_static(b"[1,2]")).model(), None);
        assert_eq!(Payload::from_bytes(Bytes::from_static(b"{\"model\":7}")).model(), None);
        assert_eq!(Payload::from_bytes(Bytes::from_static(b"text")).model(), None);
    }

    #[test]
    fn source_tags() {
        assert_eq!(source_tag("openrouter"), "openrouter_server_proxy");
        assert_eq!(source_tag("nope"), DEFAULT_SOURCE);
    }
}
