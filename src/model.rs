use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::UnsupportedProvider;

/// The closed set of LLM providers the gateway knows how to reach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Google,
    OpenAi,
    Anthropic,
    DeepSeek,
    Xai,
    OpenRouter,
    OpenAiCompatible,
    Pollinations,
    Ollama,
}

impl ProviderId {
    pub const ALL: [ProviderId; 9] = [
        ProviderId::Google,
        ProviderId::OpenAi,
        ProviderId::Anthropic,
        ProviderId::DeepSeek,
        ProviderId::Xai,
        ProviderId::OpenRouter,
        ProviderId::OpenAiCompatible,
        ProviderId::Pollinations,
        ProviderId::Ollama,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::Google => "google",
            ProviderId::OpenAi => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::DeepSeek => "deepseek",
            ProviderId::Xai => "xai",
            ProviderId::OpenRouter => "openrouter",
            ProviderId::OpenAiCompatible => "openaicompatible",
            ProviderId::Pollinations => "pollinations",
            ProviderId::Ollama => "ollama",
        }
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = UnsupportedProvider;

    /// Exact, case-sensitive match against the provider identifiers.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| UnsupportedProvider(s.to_string()))
    }
}

/// Who holds the real provider key.
///
/// `Local`: the caller sends its own key straight to the provider.
/// `Proxy`: the caller sends a short-lived signature and the gateway
/// substitutes the server-held key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentMode {
    Local,
    #[default]
    Proxy,
}

impl DeploymentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentMode::Local => "local",
            DeploymentMode::Proxy => "proxy",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(DeploymentMode::Local),
            "proxy" => Ok(DeploymentMode::Proxy),
            other => Err(format!("unknown deployment mode `{other}` (expected `local` or `proxy`)")),
        }
    }
}

/// How a provider expects its API key to be attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStyle {
    /// `Authorization: Bearer <key>`
    Bearer,
    /// The raw key in a provider-specific header.
    Header(&'static str),
    /// No credential at all.
    None,
}

impl AuthStyle {
    /// Header name and value carrying `key`, or `None` for keyless providers.
    pub fn header_for(&self, key: &str) -> Option<(&'static str, String)> {
        match self {
            AuthStyle::Bearer => Some(("authorization", format!("Bearer {key}"))),
            AuthStyle::Header(name) => Some((*name, key.to_string())),
            AuthStyle::None => None,
        }
    }
}

/// Static connection parameters for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderConfig {
    pub id: ProviderId,
    /// Provider origin used when nothing overrides it.
    pub default_base_url: &'static str,
    pub auth_style: AuthStyle,
    /// Headers the provider requires on every call.
    pub extra_headers: &'static [(&'static str, &'static str)],
    /// API version path appended to the base URL, e.g. `/v1`.
    pub path_suffix: &'static str,
    /// Prefix of the `<PREFIX>_API_KEY` / `<PREFIX>_API_BASE_URL` variables.
    pub env_prefix: &'static str,
}
