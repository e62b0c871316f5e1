//! Static per-provider configuration and the registry that selects a
//! strategy for each configured provider.

use std::collections::HashMap;
use std::time::Duration;

use crate::error::{provider_error, Error, ProviderErrorKind};
use crate::oauth::providers::{github, google, wechat};
use crate::oauth::{ProviderKind, ProviderStrategy};

/// Endpoint URLs for one provider.
///
/// Kept separate from the credentials so tests can point a strategy at a
/// local mock server.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    /// Authorization endpoint the user is redirected to.
    pub authorize: String,
    /// Token endpoint the authorization code is exchanged at.
    pub token: String,
    /// User-info endpoint.
    pub userinfo: String,
    /// Secondary user-emails endpoint (GitHub only).
    pub user_emails: Option<String>,
}

impl ProviderEndpoints {
    /// GitHub's production endpoints.
    pub fn github() -> Self {
        Self {
            authorize: "https://github.com/login/oauth/authorize".to_string(),
            token: "https://github.com/login/oauth/access_token".to_string(),
            userinfo: "https://api.github.com/user".to_string(),
            user_emails: Some("https://api.github.com/user/emails".to_string()),
        }
    }

    /// WeChat's production endpoints (web login / QR connect).
    pub fn wechat() -> Self {
        Self {
            authorize: "https://open.weixin.qq.com/connect/qrconnect".to_string(),
            token: "https://api.weixin.qq.com/sns/oauth2/access_token".to_string(),
            userinfo: "https://api.weixin.qq.com/sns/userinfo".to_string(),
            user_emails: None,
        }
    }

    /// Google's production endpoints.
    pub fn google() -> Self {
        Self {
            authorize: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            token: "https://oauth2.googleapis.com/token".to_string(),
            userinfo: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
            user_emails: None,
        }
    }
}

/// Default per-call timeout for provider requests.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Immutable configuration for one provider, loaded once at process start.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Provider identifier.
    pub provider: ProviderKind,
    /// OAuth client id (WeChat calls this the `appid`).
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Redirect URI registered with the provider.
    pub redirect_uri: String,
    /// Scope string sent on the authorize redirect.
    pub scope: String,
    /// Endpoint URLs.
    pub endpoints: ProviderEndpoints,
    /// Per-call HTTP timeout for this provider's requests.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// GitHub configuration with default scope and production endpoints.
    pub fn github(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            provider: ProviderKind::Github,
            client_id,
            client_secret,
            redirect_uri,
            scope: "read:user user:email".to_string(),
            endpoints: ProviderEndpoints::github(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// WeChat configuration with default scope and production endpoints.
    pub fn wechat(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            provider: ProviderKind::Wechat,
            client_id,
            client_secret,
            redirect_uri,
            scope: "snsapi_login".to_string(),
            endpoints: ProviderEndpoints::wechat(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Google configuration with default scope and production endpoints.
    pub fn google(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            provider: ProviderKind::Google,
            client_id,
            client_secret,
            redirect_uri,
            scope: "openid email profile".to_string(),
            endpoints: ProviderEndpoints::google(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Replace the endpoint URLs (used to target a mock server in tests).
    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    /// Replace the per-call HTTP timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check that the fields required to start an authorization are present.
    pub fn ensure_configured(&self) -> Result<(), Error> {
        if self.client_id.is_empty() || self.redirect_uri.is_empty() {
            return Err(provider_error(
                ProviderErrorKind::Misconfigured,
                &format!("{} client id or redirect URI is empty", self.provider),
            ));
        }
        Ok(())
    }
}

/// Process-wide registry of configured providers.
///
/// Read-only after construction. Builds one [`ProviderStrategy`] per
/// configured provider so call sites select a strategy once instead of
/// branching on the provider id throughout the flow.
pub struct Registry {
    configs: HashMap<ProviderKind, ProviderConfig>,
    strategies: HashMap<ProviderKind, Box<dyn ProviderStrategy>>,
}

impl Registry {
    /// Build a registry from provider configurations.
    ///
    /// # Errors
    ///
    /// Fails if the underlying HTTP client cannot be constructed.
    pub fn new(configs: Vec<ProviderConfig>) -> Result<Self, Error> {
        let mut config_map = HashMap::new();
        let mut strategies: HashMap<ProviderKind, Box<dyn ProviderStrategy>> = HashMap::new();

        for config in configs {
            let strategy: Box<dyn ProviderStrategy> = match config.provider {
                ProviderKind::Github => Box::new(github::Provider::new(config.clone())?),
                ProviderKind::Wechat => Box::new(wechat::Provider::new(config.clone())?),
                ProviderKind::Google => Box::new(google::Provider::new(config.clone())?),
            };
            // Key by what the strategy reports, so a strategy can never be
            // registered under a provider it does not implement.
            strategies.insert(strategy.provider(), strategy);
            config_map.insert(config.provider, config);
        }

        Ok(Self {
            configs: config_map,
            strategies,
        })
    }

    /// Look up the configuration for a provider.
    pub fn config(&self, provider: ProviderKind) -> Result<&ProviderConfig, Error> {
        self.configs.get(&provider).ok_or_else(|| {
            provider_error(
                ProviderErrorKind::Unsupported,
                &format!("{} is not configured", provider),
            )
        })
    }

    /// Look up the strategy for a provider.
    pub fn strategy(&self, provider: ProviderKind) -> Result<&dyn ProviderStrategy, Error> {
        self.strategies
            .get(&provider)
            .map(|s| s.as_ref())
            .ok_or_else(|| {
                provider_error(
                    ProviderErrorKind::Unsupported,
                    &format!("{} is not configured", provider),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_github_config_defaults() {
        let config = ProviderConfig::github(
            "id".to_string(),
            "secret".to_string(),
            "https://example.com/callback".to_string(),
        );
        assert_eq!(config.provider, ProviderKind::Github);
        assert_eq!(config.scope, "read:user user:email");
        assert!(config.endpoints.user_emails.is_some());
    }

    #[test]
    fn test_misconfigured_provider() {
        let config = ProviderConfig::google(
            String::new(),
            "secret".to_string(),
            "https://example.com/callback".to_string(),
        );
        let err = config.ensure_configured().unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Provider(ProviderErrorKind::Misconfigured)
        );
    }

    #[test]
    fn test_strategy_reports_its_provider() {
        let registry = Registry::new(vec![ProviderConfig::github(
            "id".to_string(),
            "secret".to_string(),
            "https://example.com/callback".to_string(),
        )])
        .unwrap();
        let strategy = registry.strategy(ProviderKind::Github).unwrap();
        assert_eq!(strategy.provider(), ProviderKind::Github);
    }

    #[test]
    fn test_unconfigured_provider_lookup() {
        let registry = Registry::new(vec![]).unwrap();
        let err = registry.config(ProviderKind::Github).unwrap_err();
        assert_eq!(
            err.error_kind,
            ErrorKind::Provider(ProviderErrorKind::Unsupported)
        );
    }
}
