//! Google OAuth provider implementation.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{exchange_error, Error, ErrorKind, ExchangeErrorKind};
use crate::oauth::{CanonicalProfile, ProviderKind, ProviderStrategy, TokenSet};
use crate::registry::ProviderConfig;

/// Request to exchange an authorization code for tokens.
///
/// Google expects a form-urlencoded body.
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    grant_type: &'a str,
    redirect_uri: &'a str,
}

/// Token response from Google.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: SecretString,
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<SecretString>,
    #[serde(default)]
    scope: Option<String>,
}

/// User record from Google's userinfo endpoint.
#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    picture: Option<String>,
}

/// Google OAuth provider.
pub struct Provider {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl Provider {
    /// Create a new Google OAuth provider.
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        let http_client = super::http_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl ProviderStrategy for Provider {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn authorization_url(&self, state: &str) -> Result<String, Error> {
        self.config.ensure_configured()?;

        let url = url::Url::parse_with_params(
            &self.config.endpoints.authorize,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", self.config.scope.as_str()),
                ("state", state),
            ],
        )
        .map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Http(crate::error::HttpErrorKind::BuilderFailed),
        })?;

        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, Error> {
        let request = TokenExchangeRequest {
            client_id: &self.config.client_id,
            client_secret: &self.config.client_secret,
            code,
            grant_type: "authorization_code",
            redirect_uri: &self.config.redirect_uri,
        };

        debug!("Exchanging Google authorization code for tokens");

        let response = self
            .http_client
            .post(&self.config.endpoints.token)
            .form(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("Google token exchange failed ({}): {}", status, error_text);
            return Err(exchange_error(
                ExchangeErrorKind::TokenExchangeFailed,
                &format!("Google token endpoint returned {}: {}", status, error_text),
            ));
        }

        let tokens: TokenResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse Google token response: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
            }
        })?;

        Ok(TokenSet {
            access_token: tokens.access_token,
            token_type: tokens.token_type,
            scope: tokens.scope,
            expires_in: tokens.expires_in,
            refresh_token: tokens.refresh_token,
            openid: None,
        })
    }

    async fn fetch_profile(&self, tokens: &TokenSet) -> Result<CanonicalProfile, Error> {
        let response = self
            .http_client
            .get(&self.config.endpoints.userinfo)
            .bearer_auth(tokens.access_token.expose_secret())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("Google userinfo endpoint returned {}", status);
            return Err(exchange_error(
                ExchangeErrorKind::ProfileFetchFailed,
                &format!("Google userinfo endpoint returned {}", status),
            ));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
        })?;

        let user: GoogleUser = serde_json::from_value(raw.clone()).map_err(|e| {
            warn!("Failed to parse Google user record: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
            }
        })?;

        Ok(CanonicalProfile {
            external_id: user.id,
            display_name: user.name.unwrap_or_else(|| user.email.clone()),
            email: user.email,
            avatar_url: user.picture,
            provider: ProviderKind::Google,
            raw,
        })
    }
}
