//! The one call the UI makes: send a chat request to whichever provider is
//! active and get back either the provider's JSON or a displayable error.

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use crate::balancer::KeyPool;
use crate::model::{DeploymentMode, ProviderId};
use crate::normalize::{normalize, GenericError, NormalizedError, RawError};
use crate::registry::{provider, ProviderRegistry, RequestContext, UserOverrides};

#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    /// One key or several separated by commas.
    pub api_key: String,
    pub api_proxy: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    /// Identifier of the active provider, as stored in settings.
    pub provider: String,
    pub mode: DeploymentMode,
    pub access_password: String,
    /// Absolute origin of the gateway, used in proxy mode.
    pub proxy_origin: String,
    /// Page URL reported to providers that want one.
    pub referer: Option<String>,
    pub providers: HashMap<ProviderId, ProviderSettings>,
}

pub struct ChatClient {
    http: reqwest::Client,
    registry: ProviderRegistry,
    settings: ClientSettings,
    pools: HashMap<ProviderId, KeyPool>,
}

impl ChatClient {
    pub fn new(settings: ClientSettings) -> Self {
        let pools = settings
            .providers
            .iter()
            .map(|(id, p)| (*id, KeyPool::with_random_start(&p.api_key)))
            .collect();
        Self {
            http: reqwest::Client::new(),
            registry: ProviderRegistry::new(settings.mode, settings.proxy_origin.clone()),
            settings,
            pools,
        }
    }

    pub fn with_http(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// POSTs `body` to the active provider's chat endpoint for `model`.
    pub async fn complete(&self, model: &str, body: &Value) -> Result<Value, NormalizedError> {
        let id: Option<ProviderId> = self.settings.provider.parse().ok();
        let provider_settings = id.and_then(|id| self.settings.providers.get(&id));
        let ctx = RequestContext {
            referer: self.settings.referer.clone(),
        };
        let overrides = UserOverrides {
            api_proxy: provider_settings.and_then(|p| p.api_proxy.as_deref()),
            keys: id.and_then(|id| self.pools.get(&id)),
            access_password: &self.settings.access_password,
            context: Some(&ctx),
        };

        let connection = self
            .registry
            .resolve(&self.settings.provider, &overrides)
            .map_err(|e| normalize(&RawError::Error(GenericError::new(e.to_string()))).with_status(400))?;

        let url = connection.url(&provider(connection.provider).chat_path(model));
        debug!(provider = %connection.provider, mode = %self.registry.mode(), "Sending chat request");

        let mut request = self.http.post(&url).json(body);
        for (name, value) in &connection.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.send().await.map_err(|e| {
            warn!(provider = %connection.provider, error = %e, "Chat request failed");
            normalize(&RawError::from(&e))
        })?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| normalize(&RawError::from(&e)))?;

        if !status.is_success() {
            warn!(provider = %connection.provider, status = status.as_u16(), "Provider returned an error");
            return Err(normalize(&RawError::upstream(status.as_u16(), text)));
        }

        serde_json::from_str(&text).map_err(|e| {
            normalize(&RawError::Error(GenericError::new(format!(
                "Malformed response from {}: {e}",
                connection.provider
            ))))
            .with_status(502)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unsupported_provider_is_a_client_error() {
        let client = ChatClient::new(ClientSettings {
            provider: "mistral".to_string(),
            mode: DeploymentMode::Local,
            ..Default::default()
        });
        let err = client.complete("m", &serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.status_code, 400);
        assert!(err.message.contains("mistral"));
    }

    #[tokio::test]
    async fn relative_proxy_origin_fails_cleanly() {
        let client = ChatClient::new(ClientSettings {
            provider: "openai".to_string(),
            mode: DeploymentMode::Proxy,
            proxy_origin: String::new(),
            ..Default::default()
        });
        let err = client.complete("gpt-4.1", &serde_json::json!({})).await.unwrap_err();
        assert_eq!(err.status_code, 500);
        assert!(!err.message.is_empty());
    }
}
