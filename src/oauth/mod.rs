//! OAuth 2.0 authorization-code flow infrastructure.
//!
//! Covers authorization-URL building, anti-CSRF state handling, per-provider
//! code exchange and profile normalization, and the callback coordinator.

mod flow;
mod provider;
mod state;

pub mod providers;

pub use flow::{AuthFlow, CallbackOutcome, CallbackParams, LoginDelegate, SessionResult};
pub use provider::{CanonicalProfile, ProviderKind, ProviderStrategy, TokenSet};
pub use state::StateStore;
