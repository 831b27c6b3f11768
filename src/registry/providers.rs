//! One variant per provider. Most only differ in their static
//! [`ProviderConfig`]; the rest override the hooks they need.

use crate::model::{AuthStyle, ProviderConfig, ProviderId};

use super::{Provider, RequestContext};

pub const OPENROUTER_TITLE: &str = "Deep Research";
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct Google;
pub struct OpenAi;
pub struct Anthropic;
pub struct DeepSeek;
pub struct Xai;
pub struct OpenRouter;
pub struct OpenAiCompatible;
pub struct Pollinations;
pub struct Ollama;

static GOOGLE: ProviderConfig = ProviderConfig {
    id: ProviderId::Google,
    default_base_url: "https://generativelanguage.googleapis.com",
    auth_style: AuthStyle::Header("x-goog-api-key"),
    extra_headers: &[],
    path_suffix: "/v1beta",
    env_prefix: "GOOGLE_GENERATIVE_AI",
};

static OPENAI: ProviderConfig = ProviderConfig {
    id: ProviderId::OpenAi,
    default_base_url: "https://api.openai.com",
    auth_style: AuthStyle::Bearer,
    extra_headers: &[],
    path_suffix: "/v1",
    env_prefix: "OPENAI",
};

static ANTHROPIC: ProviderConfig = ProviderConfig {
    id: ProviderId::Anthropic,
    default_base_url: "https://api.anthropic.com",
    auth_style: AuthStyle::Header("x-api-key"),
    extra_headers: &[("anthropic-version", ANTHROPIC_VERSION)],
    path_suffix: "/v1",
    env_prefix: "ANTHROPIC",
};

static DEEPSEEK: ProviderConfig = ProviderConfig {
    id: ProviderId::DeepSeek,
    default_base_url: "https://api.deepseek.com",
    auth_style: AuthStyle::Bearer,
    extra_headers: &[],
    path_suffix: "/v1",
    env_prefix: "DEEPSEEK",
};

static XAI: ProviderConfig = ProviderConfig {
    id: ProviderId::Xai,
    default_base_url: "https://api.x.ai",
    auth_style: AuthStyle::Bearer,
    extra_headers: &[],
    path_suffix: "/v1",
    env_prefix: "XAI",
};

static OPENROUTER: ProviderConfig = ProviderConfig {
    id: ProviderId::OpenRouter,
    default_base_url: "https://openrouter.ai",
    auth_style: AuthStyle::Bearer,
    extra_headers: &[("X-Title", OPENROUTER_TITLE)],
    path_suffix: "/api/v1",
    env_prefix: "OPENROUTER",
};

static OPENAI_COMPATIBLE: ProviderConfig = ProviderConfig {
    id: ProviderId::OpenAiCompatible,
    default_base_url: "https://api.openai.com",
    auth_style: AuthStyle::Bearer,
    extra_headers: &[],
    path_suffix: "/v1",
    env_prefix: "OPENAI_COMPATIBLE",
};

static POLLINATIONS: ProviderConfig = ProviderConfig {
    id: ProviderId::Pollinations,
    default_base_url: "https://text.pollinations.ai/openai",
    auth_style: AuthStyle::None,
    extra_headers: &[],
    path_suffix: "/v1",
    env_prefix: "POLLINATIONS",
};

static OLLAMA: ProviderConfig = ProviderConfig {
    id: ProviderId::Ollama,
    default_base_url: "http://0.0.0.0:11434",
    auth_style: AuthStyle::None,
    extra_headers: &[],
    path_suffix: "/api",
    env_prefix: "OLLAMA",
};

impl Provider for Google {
    fn config(&self) -> &'static ProviderConfig {
        &GOOGLE
    }

    fn chat_path(&self, model: &str) -> String {
        format!("models/{model}:generateContent")
    }
}

impl Provider for OpenAi {
    fn config(&self) -> &'static ProviderConfig {
        &OPENAI
    }

    /// The gpt-4o family is served through the Responses API.
    fn chat_path(&self, model: &str) -> String {
        if model.starts_with("gpt-4o") {
            "responses".to_string()
        } else {
            "chat/completions".to_string()
        }
    }
}

impl Provider for Anthropic {
    fn config(&self) -> &'static ProviderConfig {
        &ANTHROPIC
    }

    // Anthropic rejects browser-originated calls without this.
    fn local_headers(&self) -> Vec<(&'static str, String)> {
        vec![("anthropic-dangerous-direct-browser-access", "true".to_string())]
    }

    fn forwarded_headers(&self) -> &'static [&'static str] {
        &["anthropic-beta"]
    }

    fn chat_path(&self, _model: &str) -> String {
        "messages".to_string()
    }
}

impl Provider for DeepSeek {
    fn config(&self) -> &'static ProviderConfig {
        &DEEPSEEK
    }
}

impl Provider for Xai {
    fn config(&self) -> &'static ProviderConfig {
        &XAI
    }
}

impl Provider for OpenRouter {
    fn config(&self) -> &'static ProviderConfig {
        &OPENROUTER
    }

    /// OpenRouter attributes traffic by `HTTP-Referer`, which must name the
    /// deployment actually serving the request.
    fn context_headers(&self, ctx: &RequestContext) -> Vec<(&'static str, String)> {
        ctx.referer
            .iter()
            .map(|referer| ("HTTP-Referer", referer.clone()))
            .collect()
    }
}

impl Provider for OpenAiCompatible {
    fn config(&self) -> &'static ProviderConfig {
        &OPENAI_COMPATIBLE
    }
}

impl Provider for Pollinations {
    fn config(&self) -> &'static ProviderConfig {
        &POLLINATIONS
    }
}

impl Provider for Ollama {
    fn config(&self) -> &'static ProviderConfig {
        &OLLAMA
    }

    fn chat_path(&self, _model: &str) -> String {
        "chat".to_string()
    }
}

/// The provider variant for `id`.
pub fn provider(id: ProviderId) -> &'static dyn Provider {
    match id {
        ProviderId::Google => &Google,
        ProviderId::OpenAi => &OpenAi,
        ProviderId::Anthropic => &Anthropic,
        ProviderId::DeepSeek => &DeepSeek,
        ProviderId::Xai => &Xai,
        ProviderId::OpenRouter => &OpenRouter,
        ProviderId::OpenAiCompatible => &OpenAiCompatible,
        ProviderId::Pollinations => &Pollinations,
        ProviderId::Ollama => &Ollama,
    }
}
