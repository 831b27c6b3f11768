//! Fake OpenAI-style upstream for exercising the gateway locally.
//!
//! Point a provider at it with e.g. `OPENROUTER_API_BASE_URL=http://localhost:3001`.
//! Calls without a bearer key get OpenRouter's "No auth credentials" error;
//! `--error-rate` injects 500s.

use axum::{
    http::{header, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use clap::Parser;
use rand::Rng;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone, Parser)]
#[command(name = "mock_provider")]
struct ServerConfig {
    #[arg(long, default_value_t = 3001)]
    port: u16,

    #[arg(long, default_value_t = 50)]
    latency_ms: u64,

    #[arg(long, default_value_t = 0.0)]
    error_rate: f64,

    /// Only this key is accepted when set.
    #[arg(long, env = "MOCK_API_KEY")]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let config = ServerConfig::parse();

    let app = Router::new()
        .route("/api/v1/chat/completions", post(chat))
        .route("/v1/chat/completions", post(chat))
        .route("/api/v1/models", get(models))
        .route("/v1/models", get(models))
        .with_state(config.clone());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    tracing::info!(
        %addr,
        latency_ms = config.latency_ms,
        error_rate = config.error_rate,
        "Mock provider running"
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn authorize(config: &ServerConfig, headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    let key = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|k| !k.is_empty());

    match (key, &config.api_key) {
        (None, _) => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "No auth credentials found", "code": 401}})),
        )),
        (Some(key), Some(expected)) if key != expected.as_str() => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"error": {"message": "Invalid API key", "code": "invalid_api_key"}})),
        )),
        _ => Ok(()),
    }
}

async fn models(
    axum::extract::State(config): axum::extract::State<ServerConfig>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    if let Err(rejection) = authorize(&config, &headers) {
        return rejection;
    }
    (
        StatusCode::OK,
        Json(json!({"data": [{"id": "mock/model", "object": "model"}]})),
    )
}

async fn chat(
    axum::extract::State(config): axum::extract::State<ServerConfig>,
    headers: HeaderMap,
    Json(req): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if let Err(rejection) = authorize(&config, &headers) {
        return rejection;
    }

    let jitter = rand::thread_rng().gen_range(0..=20);
    sleep(Duration::from_millis(config.latency_ms + jitter)).await;

    if config.error_rate > 0.0 && rand::thread_rng().gen_bool(config.error_rate.min(1.0)) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": {"message": "simulated failure", "type": "server_error"}})),
        );
    }

    let model = req.get("model").and_then(Value::as_str).unwrap_or("mock/model");
    (
        StatusCode::OK,
        Json(json!({
            "id": "mock-response",
            "object": "chat.completion",
            "created": chrono::Utc::now().timestamp(),
            "model": model,
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": "Hello! This is a mock response from the provider."
                },
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": 10,
                "completion_tokens": 10,
                "total_tokens": 20
            }
        })),
    )
}
