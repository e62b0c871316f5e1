//! Error types for the `social-auth` crate.
//!
//! Follows a root Error struct with error kind enums so callers can match on
//! the exact failure category. CSRF/replay failures are never collapsed into a
//! generic kind; callers need the distinction for security telemetry.

use std::error::Error as StdError;
use std::fmt;

/// Top-level error type for social-auth.
/// Holds error kind and optional source for error chaining.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

/// Major categories of errors in social-auth.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Provider(ProviderErrorKind),
    State(StateErrorKind),
    Callback(CallbackErrorKind),
    Exchange(ExchangeErrorKind),
    Token(TokenErrorKind),
    Http(HttpErrorKind),
}

/// Errors from provider registry lookups and configuration.
#[derive(Debug, PartialEq)]
pub enum ProviderErrorKind {
    /// Provider id is not one of the supported providers.
    Unsupported,
    /// Provider exists but its client id or redirect URI is empty.
    Misconfigured,
}

/// Errors from anti-CSRF state validation.
#[derive(Debug, PartialEq)]
pub enum StateErrorKind {
    /// State value was never issued by this process.
    NotFound,
    /// State value was issued but its TTL has passed.
    Expired,
    /// State value was already consumed once (replay).
    AlreadyConsumed,
}

/// Errors from the callback flow before any provider call is made.
#[derive(Debug, PartialEq)]
pub enum CallbackErrorKind {
    /// The provider redirected back with an `error` query parameter.
    ProviderDenied,
    /// The callback carried no authorization code.
    MissingAuthorizationCode,
}

/// Errors from the authorization-code exchange and profile fetch.
#[derive(Debug, PartialEq)]
pub enum ExchangeErrorKind {
    /// Non-success HTTP status from a provider token endpoint.
    TokenExchangeFailed,
    /// Non-success HTTP status from a provider user-info endpoint.
    ProfileFetchFailed,
    /// In-band provider failure inside a 200 response (WeChat `errcode`).
    ProviderApi { code: i64, message: String },
    /// Response body did not match the provider's documented shape.
    InvalidResponse,
}

/// Errors from the compact signed token codec.
#[derive(Debug, PartialEq)]
pub enum TokenErrorKind {
    /// Token does not have exactly three base64url segments.
    Malformed,
    /// HMAC recomputation did not match the signature segment.
    InvalidSignature,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    Network,
    Timeout,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.error_kind {
            ErrorKind::Provider(kind) => write!(f, "provider error: {:?}", kind),
            ErrorKind::State(kind) => write!(f, "state error: {:?}", kind),
            ErrorKind::Callback(kind) => write!(f, "callback error: {:?}", kind),
            ErrorKind::Exchange(kind) => write!(f, "exchange error: {:?}", kind),
            ErrorKind::Token(kind) => write!(f, "token error: {:?}", kind),
            ErrorKind::Http(kind) => write!(f, "HTTP error: {:?}", kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_timeout() {
            ErrorKind::Http(HttpErrorKind::Timeout)
        } else if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
        }
    }
}

/// Helper function to create provider errors.
pub fn provider_error(kind: ProviderErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Provider(kind),
    }
}

/// Helper function to create state errors.
pub fn state_error(kind: StateErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::State(kind),
    }
}

/// Helper function to create callback errors.
pub fn callback_error(kind: CallbackErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Callback(kind),
    }
}

/// Helper function to create exchange errors.
pub fn exchange_error(kind: ExchangeErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Exchange(kind),
    }
}

/// Helper function to create compact token errors.
pub fn token_error(kind: TokenErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Token(kind),
    }
}
