//! Provider registry: where a call for a given provider goes and what it
//! carries, for the deployment mode the registry was built with.

mod providers;

pub use providers::{provider, ANTHROPIC_VERSION, OPENROUTER_TITLE};

use crate::balancer::KeyPool;
use crate::error::UnsupportedProvider;
use crate::model::{AuthStyle, DeploymentMode, ProviderConfig, ProviderId};
use crate::signature::SignedRequest;

/// Path under the gateway's origin that proxied calls are mounted on.
pub const PROXY_ROUTE_PREFIX: &str = "/api/ai";

/// Per-call facts some providers fold into their headers.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Public URL of the deployment making the call.
    pub referer: Option<String>,
}

impl RequestContext {
    /// Derives the referer from an inbound `Host` header.
    pub fn from_host(host: Option<&str>) -> Self {
        Self {
            referer: host.filter(|h| !h.is_empty()).map(referer_for_host),
        }
    }
}

/// `http://` for localhost, `https://` otherwise.
pub fn referer_for_host(host: &str) -> String {
    let scheme = if host.contains("localhost") || host.starts_with("127.0.0.1") {
        "http"
    } else {
        "https"
    };
    format!("{scheme}://{host}/")
}

/// Behaviour shared by every provider variant.
pub trait Provider: Send + Sync {
    fn config(&self) -> &'static ProviderConfig;

    fn id(&self) -> ProviderId {
        self.config().id
    }

    fn requires_key(&self) -> bool {
        self.config().auth_style != AuthStyle::None
    }

    /// Headers needed only when the caller talks to the provider directly.
    fn local_headers(&self) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Headers computed from the live request.
    fn context_headers(&self, _ctx: &RequestContext) -> Vec<(&'static str, String)> {
        Vec::new()
    }

    /// Inbound headers copied upstream on top of the common allowlist.
    fn forwarded_headers(&self) -> &'static [&'static str] {
        &[]
    }

    /// Endpoint, relative to the versioned base URL, that serves chat for `model`.
    fn chat_path(&self, _model: &str) -> String {
        "chat/completions".to_string()
    }

    /// Static plus context headers, in that order.
    fn request_headers(&self, ctx: &RequestContext) -> Vec<(String, String)> {
        self.config()
            .extra_headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .chain(
                self.context_headers(ctx)
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v)),
            )
            .collect()
    }
}

/// Joins `suffix` onto `base` exactly once, with a single `/` between them.
pub fn complete_path(base: &str, suffix: &str) -> String {
    let base = base.trim_end_matches('/');
    let suffix = suffix.trim_matches('/');
    if suffix.is_empty() || base.ends_with(&format!("/{suffix}")) {
        return base.to_string();
    }
    format!("{base}/{suffix}")
}

/// What the user configured for one provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct UserOverrides<'a> {
    /// Replaces the provider's default base URL in local mode.
    pub api_proxy: Option<&'a str>,
    pub keys: Option<&'a KeyPool>,
    /// Shared password proxy-mode tokens are signed with.
    pub access_password: &'a str,
    pub context: Option<&'a RequestContext>,
}

/// A resolved connection: where to send the call and what to attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connection {
    pub provider: ProviderId,
    pub base_url: String,
    /// Includes the credential header when there is one.
    pub headers: Vec<(String, String)>,
    /// The real key in local mode, a signature in proxy mode.
    pub auth_token: Option<String>,
}

impl Connection {
    pub fn url(&self, path: &str) -> String {
        complete_path(&self.base_url, path)
    }
}

#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    mode: DeploymentMode,
    /// Origin of the gateway, e.g. `https://research.example.com`. Empty
    /// yields origin-relative proxy URLs.
    proxy_origin: String,
}

impl ProviderRegistry {
    pub fn new(mode: DeploymentMode, proxy_origin: impl Into<String>) -> Self {
        Self {
            mode,
            proxy_origin: proxy_origin.into(),
        }
    }

    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    pub fn resolve(
        &self,
        provider_id: &str,
        overrides: &UserOverrides<'_>,
    ) -> Result<Connection, UnsupportedProvider> {
        self.resolve_at(provider_id, overrides, chrono::Utc::now().timestamp_millis())
    }

    /// [`ProviderRegistry::resolve`] with an explicit clock for proxy-mode signing.
    pub fn resolve_at(
        &self,
        provider_id: &str,
        overrides: &UserOverrides<'_>,
        now_ms: i64,
    ) -> Result<Connection, UnsupportedProvider> {
        let id: ProviderId = provider_id.parse()?;
        let provider = provider(id);
        let config = provider.config();
        let default_ctx = RequestContext::default();
        let ctx = overrides.context.unwrap_or(&default_ctx);

        let mut headers = provider.request_headers(ctx);

        let connection = match self.mode {
            DeploymentMode::Local => {
                let base = overrides
                    .api_proxy
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .unwrap_or(config.default_base_url);
                headers.extend(
                    provider
                        .local_headers()
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v)),
                );
                let auth_token = if provider.requires_key() {
                    overrides.keys.and_then(KeyPool::next).map(str::to_string)
                } else {
                    None
                };
                if let Some((name, value)) = auth_token
                    .as_deref()
                    .and_then(|key| config.auth_style.header_for(key))
                {
                    headers.push((name.to_string(), value));
                }
                Connection {
                    provider: id,
                    base_url: complete_path(base, config.path_suffix),
                    headers,
                    auth_token,
                }
            }
            DeploymentMode::Proxy => {
                let token = SignedRequest::new(overrides.access_password, second_floor(now_ms));
                // Keyless providers still have to authenticate to the gateway.
                let style = match config.auth_style {
                    AuthStyle::None => AuthStyle::Bearer,
                    style => style,
                };
                if let Some((name, value)) = style.header_for(&token.signature) {
                    headers.push((name.to_string(), value));
                }
                let base = format!(
                    "{}{}/{}",
                    self.proxy_origin.trim_end_matches('/'),
                    PROXY_ROUTE_PREFIX,
                    id
                );
                Connection {
                    provider: id,
                    base_url: complete_path(&base, config.path_suffix),
                    headers,
                    auth_token: Some(token.signature),
                }
            }
        };
        Ok(connection)
    }
}

fn second_floor(ms: i64) -> i64 {
    ms.saturating_sub(ms.rem_euclid(1000))
}
