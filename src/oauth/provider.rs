//! Provider strategy trait and the types shared by all providers.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::{provider_error, Error, ProviderErrorKind};

/// Known third-party login providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    Github,
    Wechat,
    Google,
}

impl ProviderKind {
    /// Get the provider identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Github => "github",
            ProviderKind::Wechat => "wechat",
            ProviderKind::Google => "google",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "github" => Ok(ProviderKind::Github),
            "wechat" => Ok(ProviderKind::Wechat),
            "google" => Ok(ProviderKind::Google),
            other => Err(provider_error(
                ProviderErrorKind::Unsupported,
                &format!("unsupported provider id: {}", other),
            )),
        }
    }
}

/// Tokens returned by a provider's token endpoint.
///
/// Ephemeral: produced by the code exchange, consumed immediately by the
/// profile fetch, never persisted by this crate.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Access token for provider API requests.
    pub access_token: SecretString,
    /// Token type (usually "bearer").
    pub token_type: String,
    /// Granted scopes, if the provider reports them.
    pub scope: Option<String>,
    /// Seconds until the access token expires, if reported.
    pub expires_in: Option<i64>,
    /// Refresh token, if the provider issued one.
    pub refresh_token: Option<SecretString>,
    /// WeChat's user identifier, returned alongside the access token.
    /// `None` for every other provider.
    pub openid: Option<String>,
}

/// Provider-agnostic identity record produced after normalizing a provider's
/// user-info response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalProfile {
    /// Provider's unique user identifier. Together with `provider` this is
    /// the stable identity key handed to the backend login boundary.
    pub external_id: String,
    /// User's display name.
    pub display_name: String,
    /// User's email address. May be synthesized (`{login}@github.local`,
    /// `{openid}@wechat.local`) when the provider exposes none; synthesized
    /// addresses are not contactable.
    pub email: String,
    /// User's avatar URL, if any.
    pub avatar_url: Option<String>,
    /// Provider this profile came from.
    pub provider: ProviderKind,
    /// Untouched provider payload, kept for audit/debug only.
    pub raw: serde_json::Value,
}

/// Trait for third-party login providers.
///
/// One implementation per provider, selected once via the registry, replacing
/// per-provider branching at the call sites. Implementations handle:
/// - Authorization URL assembly (including WeChat's `appid` quirk)
/// - Authorization code exchange (JSON, form-encoded, or query-string)
/// - User profile retrieval and normalization
#[async_trait]
pub trait ProviderStrategy: Send + Sync {
    /// Get the provider kind.
    fn provider(&self) -> ProviderKind;

    /// Assemble the authorization URL for the given CSRF state value.
    fn authorization_url(&self, state: &str) -> Result<String, Error>;

    /// Exchange an authorization code for provider tokens.
    async fn exchange_code(&self, code: &str) -> Result<TokenSet, Error>;

    /// Fetch the user's profile and normalize it.
    ///
    /// Takes the whole token set because WeChat needs the `openid` returned
    /// by the exchange, not just the access token.
    async fn fetch_profile(&self, tokens: &TokenSet) -> Result<CanonicalProfile, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_kind_round_trip() {
        for kind in [ProviderKind::Github, ProviderKind::Wechat, ProviderKind::Google] {
            assert_eq!(kind.as_str().parse::<ProviderKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_unknown_provider_id() {
        let err = "twitter".parse::<ProviderKind>().unwrap_err();
        assert_eq!(
            err.error_kind,
            crate::error::ErrorKind::Provider(ProviderErrorKind::Unsupported)
        );
    }
}
