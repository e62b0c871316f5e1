//! GitHub OAuth provider implementation.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{exchange_error, Error, ErrorKind, ExchangeErrorKind};
use crate::oauth::{CanonicalProfile, ProviderKind, ProviderStrategy, TokenSet};
use crate::registry::ProviderConfig;

/// Request to exchange an authorization code for tokens.
///
/// GitHub expects a JSON body and only returns JSON itself when asked to via
/// the Accept header.
#[derive(Debug, Serialize)]
struct TokenExchangeRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    code: &'a str,
    redirect_uri: &'a str,
}

/// Token response from GitHub.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: SecretString,
    token_type: String,
    #[serde(default)]
    scope: Option<String>,
}

/// User record from GitHub's user endpoint.
#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
}

/// One entry from GitHub's user-emails endpoint.
#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    #[serde(default)]
    primary: bool,
}

/// GitHub OAuth provider.
pub struct Provider {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl Provider {
    /// Create a new GitHub OAuth provider.
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        let http_client = super::http_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }

    /// Resolve an email for the user, falling back to the secondary emails
    /// endpoint and finally a synthesized placeholder address.
    ///
    /// GitHub only exposes `email` on the user record when the user made it
    /// public. The placeholder `{login}@github.local` is deliberately not a
    /// resolvable address.
    async fn resolve_email(&self, access_token: &str, login: &str) -> Result<String, Error> {
        let emails_url = match &self.config.endpoints.user_emails {
            Some(url) => url,
            None => return Ok(format!("{}@github.local", login)),
        };

        debug!("GitHub user record had no public email, fetching emails list");

        let response = self
            .http_client
            .get(emails_url)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("GitHub emails endpoint returned {}", status);
            return Err(exchange_error(
                ExchangeErrorKind::ProfileFetchFailed,
                &format!("GitHub emails endpoint returned {}", status),
            ));
        }

        let emails: Vec<GithubEmail> = response.json().await.map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
        })?;

        let email = emails
            .iter()
            .find(|e| e.primary)
            .or_else(|| emails.first())
            .map(|e| e.email.clone())
            .unwrap_or_else(|| format!("{}@github.local", login));

        Ok(email)
    }
}

#[async_trait]
impl ProviderStrategy for Provider {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Github
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
            redirect_uri: &self.config.redirect_uri,
        };

        debug!("Exchanging GitHub authorization code for tokens");

        let response = self
            .http_client
            .post(&self.config.endpoints.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("GitHub token exchange failed ({}): {}", status, error_text);
            return Err(exchange_error(
                ExchangeErrorKind::TokenExchangeFailed,
                &format!("GitHub token endpoint returned {}: {}", status, error_text),
            ));
        }

        let tokens: TokenResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse GitHub token response: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
            }
        })?;

        Ok(TokenSet {
            access_token: tokens.access_token,
            token_type: tokens.token_type,
            scope: tokens.scope,
            expires_in: None,
            refresh_token: None,
            openid: None,
        })
    }

    async fn fetch_profile(&self, tokens: &TokenSet) -> Result<CanonicalProfile, Error> {
        let access_token = tokens.access_token.expose_secret();

        let response = self
            .http_client
            .get(&self.config.endpoints.userinfo)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("GitHub user endpoint returned {}", status);
            return Err(exchange_error(
                ExchangeErrorKind::ProfileFetchFailed,
                &format!("GitHub user endpoint returned {}", status),
            ));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
        })?;

        let user: GithubUser = serde_json::from_value(raw.clone()).map_err(|e| {
            warn!("Failed to parse GitHub user record: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
            }
        })?;

        let email = match user.email {
            Some(email) => email,
            None => self.resolve_email(access_token, &user.login).await?,
        };

        Ok(CanonicalProfile {
            external_id: user.id.to_string(),
            display_name: user.name.unwrap_or_else(|| user.login.clone()),
            email,
            avatar_url: user.avatar_url,
            provider: ProviderKind::Github,
            raw,
        })
    }
}
