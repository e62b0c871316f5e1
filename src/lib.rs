//! # social-auth
//!
//! Third-party login for the platform: drives the OAuth 2.0
//! authorization-code flow against GitHub, WeChat, and Google, normalizes
//! their divergent responses into one canonical identity, and issues a
//! compact HMAC-signed token to assert that identity afterwards.
//!
//! ## Architecture
//!
//! - `registry` holds immutable per-provider configuration and selects one
//!   strategy per provider
//! - `oauth` implements the flow itself: state issuing/consumption, the
//!   per-provider strategies, and the callback coordinator
//! - `token` signs and verifies the compact session token
//!
//! The HTTP server, session storage, and backend login endpoint live
//! elsewhere; the backend boundary is injected as a [`oauth::LoginDelegate`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use social_auth::{
//!     oauth::{AuthFlow, CallbackParams, ProviderKind},
//!     registry::{ProviderConfig, Registry},
//! };
//!
//! let registry = Registry::new(vec![ProviderConfig::github(id, secret, redirect)])?;
//! let flow = AuthFlow::new(Arc::new(registry), delegate);
//!
//! let url = flow.authorization_url(ProviderKind::Github)?;
//! // ...redirect the user, then on the callback:
//! let outcome = flow.handle_callback(params).await?;
//! ```

pub mod error;
pub mod oauth;
pub mod registry;
pub mod token;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
