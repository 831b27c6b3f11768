//! Server configuration, read once from the environment at startup.
//!
//! | Variable                 | Default | Description                                |
//! |--------------------------|---------|--------------------------------------------|
//! | `<PREFIX>_API_KEY`       | unset   | Server-held key for a provider             |
//! | `<PREFIX>_API_BASE_URL`  | builtin | Upstream origin override for a provider    |
//! | `ACCESS_PASSWORD`        | empty   | Shared secret for proxy-mode tokens        |
//! | `PUBLIC_URL`             | unset   | Referer used when a request has no `Host`  |
//! | `SIGNATURE_WINDOW_SECS`  | `30`    | How long an access token stays valid       |
//! | `MAX_BODY_BYTES`         | 16 MiB  | Largest request body the proxy will read   |
//!
//! `<PREFIX>` is each provider's `env_prefix`, e.g. `OPENROUTER`.

use std::collections::HashMap;
use std::time::Duration;

use crate::model::{DeploymentMode, ProviderId};
use crate::registry::provider;
use crate::signature::{Verifier, DEFAULT_WINDOW};

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct ProviderCredentials {
    pub api_key: Option<String>,
    pub base_url: Option<String>,
}

#[derive(Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub mode: DeploymentMode,
    pub access_password: String,
    pub public_url: Option<String>,
    pub signature_window: Duration,
    pub max_body_bytes: usize,
    providers: HashMap<ProviderId, ProviderCredentials>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            mode: DeploymentMode::default(),
            access_password: String::new(),
            public_url: None,
            signature_window: DEFAULT_WINDOW,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            providers: HashMap::new(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from any variable source. Blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let providers = ProviderId::ALL
            .into_iter()
            .map(|id| {
                let prefix = provider(id).config().env_prefix;
                let credentials = ProviderCredentials {
                    api_key: get(&format!("{prefix}_API_KEY")),
                    base_url: get(&format!("{prefix}_API_BASE_URL")),
                };
                (id, credentials)
            })
            .collect();

        let signature_window = get("SIGNATURE_WINDOW_SECS")
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WINDOW);

        let max_body_bytes = get("MAX_BODY_BYTES")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_BODY_BYTES);

        Self {
            access_password: get("ACCESS_PASSWORD").unwrap_or_default(),
            public_url: get("PUBLIC_URL"),
            signature_window,
            max_body_bytes,
            providers,
            ..Self::default()
        }
    }

    pub fn with_listen(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_mode(mut self, mode: DeploymentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_access_password(mut self, password: impl Into<String>) -> Self {
        self.access_password = password.into();
        self
    }

    pub fn with_max_body_bytes(mut self, limit: usize) -> Self {
        self.max_body_bytes = limit;
        self
    }

    pub fn with_provider(mut self, id: ProviderId, credentials: ProviderCredentials) -> Self {
        self.providers.insert(id, credentials);
        self
    }

    pub fn api_key(&self, id: ProviderId) -> Option<&str> {
        self.providers.get(&id).and_then(|c| c.api_key.as_deref())
    }

    /// Upstream origin: the override when set, otherwise the builtin default.
    pub fn base_url(&self, id: ProviderId) -> &str {
        self.providers
            .get(&id)
            .and_then(|c| c.base_url.as_deref())
            .unwrap_or(provider(id).config().default_base_url)
    }

    pub fn base_url_override(&self, id: ProviderId) -> Option<&str> {
        self.providers.get(&id).and_then(|c| c.base_url.as_deref())
    }

    pub fn verifier(&self) -> Verifier {
        Verifier::new(self.signature_window)
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

// Keys and the password must never reach logs.
impl std::fmt::Debug for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<&str> = ProviderId::ALL
            .iter()
            .filter(|id| self.api_key(**id).is_some())
            .map(|id| id.as_str())
            .collect();
        f.debug_struct("ServerConfig")
            .field("listen", &self.listen_addr())
            .field("mode", &self.mode)
            .field("access_password", &!self.access_password.is_empty())
            .field("public_url", &self.public_url)
            .field("signature_window", &self.signature_window)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("keys_configured", &keys)
            .finish()
    }
}
