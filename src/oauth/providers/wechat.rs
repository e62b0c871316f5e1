//! WeChat OAuth provider implementation.
//!
//! WeChat's web login deviates from the standard flow in three ways this
//! module has to reproduce exactly: the authorize URL uses `appid` instead of
//! `client_id` and must end with the literal `#wechat_redirect` fragment, the
//! code exchange is a query-string GET, and failures come back in-band as an
//! `errcode` field inside an otherwise 200 response.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{exchange_error, Error, ErrorKind, ExchangeErrorKind};
use crate::oauth::{CanonicalProfile, ProviderKind, ProviderStrategy, TokenSet};
use crate::registry::ProviderConfig;

/// In-band error envelope WeChat returns inside 200 responses.
#[derive(Debug, Deserialize)]
struct WechatApiError {
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// Token response from WeChat's exchange endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: SecretString,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<SecretString>,
    openid: String,
    #[serde(default)]
    scope: Option<String>,
}

/// User record from WeChat's userinfo endpoint.
#[derive(Debug, Deserialize)]
struct WechatUser {
    openid: String,
    #[serde(default)]
    nickname: Option<String>,
    #[serde(default)]
    headimgurl: Option<String>,
}

/// WeChat OAuth provider.
pub struct Provider {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl Provider {
    /// Create a new WeChat OAuth provider.
    pub fn new(config: ProviderConfig) -> Result<Self, Error> {
        let http_client = super::http_client(config.timeout)?;
        Ok(Self {
            config,
            http_client,
        })
    }
}

/// Check a 200-level WeChat payload for an in-band `errcode` failure.
///
/// A non-zero `errcode` is a provider failure even though the transport
/// reported success.
fn check_in_band_error(payload: &serde_json::Value) -> Result<(), Error> {
    if payload.get("errcode").is_some() {
        if let Ok(api_error) = serde_json::from_value::<WechatApiError>(payload.clone()) {
            if api_error.errcode != 0 {
                warn!(
                    "WeChat returned in-band error {}: {}",
                    api_error.errcode, api_error.errmsg
                );
                return Err(exchange_error(
                    ExchangeErrorKind::ProviderApi {
                        code: api_error.errcode,
                        message: api_error.errmsg.clone(),
                    },
                    &format!("WeChat errcode {}: {}", api_error.errcode, api_error.errmsg),
                ));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl ProviderStrategy for Provider {
    fn provider(&self) -> ProviderKind {
        ProviderKind::Wechat
    }

    fn authorization_url(&self, state: &str) -> Result<String, Error> {
        self.config.ensure_configured()?;

        // WeChat's web login widget requires `appid` (no `client_id`) and the
        // literal `#wechat_redirect` fragment at the end of the URL.
        let mut url = url::Url::parse_with_params(
            &self.config.endpoints.authorize,
            &[
                ("appid", self.config.client_id.as_str()),
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
        url.set_fragment(Some("wechat_redirect"));

        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<TokenSet, Error> {
        debug!("Exchanging WeChat authorization code for tokens");

        let response = self
            .http_client
            .get(&self.config.endpoints.token)
            .query(&[
                ("appid", self.config.client_id.as_str()),
                ("secret", self.config.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!("WeChat token exchange failed ({}): {}", status, error_text);
            return Err(exchange_error(
                ExchangeErrorKind::TokenExchangeFailed,
                &format!("WeChat token endpoint returned {}: {}", status, error_text),
            ));
        }

        let payload: serde_json::Value = response.json().await.map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
        })?;

        check_in_band_error(&payload)?;

        let tokens: TokenResponse = serde_json::from_value(payload).map_err(|e| {
            warn!("Failed to parse WeChat token response: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
            }
        })?;

        Ok(TokenSet {
            access_token: tokens.access_token,
            token_type: "bearer".to_string(),
            scope: tokens.scope,
            expires_in: tokens.expires_in,
            refresh_token: tokens.refresh_token,
            openid: Some(tokens.openid),
        })
    }

    async fn fetch_profile(&self, tokens: &TokenSet) -> Result<CanonicalProfile, Error> {
        // The openid travels in the token set from the exchange response.
        let openid = tokens.openid.as_deref().ok_or_else(|| {
            exchange_error(
                ExchangeErrorKind::InvalidResponse,
                "WeChat token set is missing the openid",
            )
        })?;

        let response = self
            .http_client
            .get(&self.config.endpoints.userinfo)
            .query(&[
                ("access_token", tokens.access_token.expose_secret().as_str()),
                ("openid", openid),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            warn!("WeChat userinfo endpoint returned {}", status);
            return Err(exchange_error(
                ExchangeErrorKind::ProfileFetchFailed,
                &format!("WeChat userinfo endpoint returned {}", status),
            ));
        }

        let raw: serde_json::Value = response.json().await.map_err(|e| Error {
            source: Some(Box::new(e)),
            error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
        })?;

        check_in_band_error(&raw)?;

        let user: WechatUser = serde_json::from_value(raw.clone()).map_err(|e| {
            warn!("Failed to parse WeChat user record: {:?}", e);
            Error {
                source: Some(Box::new(e)),
                error_kind: ErrorKind::Exchange(ExchangeErrorKind::InvalidResponse),
            }
        })?;

        // WeChat never exposes an email; synthesize a non-contactable one.
        let email = format!("{}@wechat.local", user.openid);

        Ok(CanonicalProfile {
            external_id: user.openid.clone(),
            display_name: user.nickname.unwrap_or(user.openid),
            email,
            avatar_url: user.headimgurl,
            provider: ProviderKind::Wechat,
            raw,
        })
    }
}
