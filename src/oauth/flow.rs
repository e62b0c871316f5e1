//! Authorization-URL building and callback coordination.
//!
//! `AuthFlow` owns the registry, the anti-CSRF state store, and the backend
//! login delegate. Each callback runs the whole state machine from the top;
//! no state is carried across invocations outside the state store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::error::{callback_error, state_error, CallbackErrorKind, Error, StateErrorKind};
use crate::oauth::{CanonicalProfile, ProviderKind, StateStore};
use crate::registry::Registry;

/// Stages of the callback flow, in order. `Failed` is represented by the
/// returned error, reachable from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CallbackStage {
    Received,
    StateValidated,
    TokenExchanged,
    ProfileFetched,
    Delegated,
    Succeeded,
}

/// Parameters parsed from the provider's redirect back to us.
#[derive(Debug, Clone)]
pub struct CallbackParams {
    /// Provider the callback route belongs to.
    pub provider: ProviderKind,
    /// Authorization code, absent when the provider denied the request.
    pub code: Option<String>,
    /// Anti-CSRF state value round-tripped through the provider.
    pub state: String,
    /// The provider's `error` query parameter, if it redirected with one.
    pub error: Option<String>,
}

/// Application session produced by the backend login boundary.
#[derive(Debug, Clone)]
pub struct SessionResult {
    /// Session token minted by the backend for the verified identity.
    pub session_token: String,
}

/// Successful callback result.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    /// The normalized identity handed to the backend.
    pub profile: CanonicalProfile,
    /// The session the backend returned for it.
    pub session: SessionResult,
}

/// Backend login boundary: exchanges a verified identity for an application
/// session. The only outbound call this crate makes into the rest of the
/// application.
#[async_trait]
pub trait LoginDelegate: Send + Sync {
    async fn login_with_profile(&self, profile: &CanonicalProfile)
        -> Result<SessionResult, Error>;
}

/// Drives the third-party login flow end to end.
pub struct AuthFlow {
    registry: Arc<Registry>,
    states: StateStore,
    delegate: Arc<dyn LoginDelegate>,
}

impl AuthFlow {
    /// Create a flow over a registry and login delegate, with a fresh state
    /// store using the default TTL.
    pub fn new(registry: Arc<Registry>, delegate: Arc<dyn LoginDelegate>) -> Self {
        Self::with_state_store(registry, StateStore::new(), delegate)
    }

    /// Create a flow with an explicit state store (custom TTL or shared
    /// across flows).
    pub fn with_state_store(
        registry: Arc<Registry>,
        states: StateStore,
        delegate: Arc<dyn LoginDelegate>,
    ) -> Self {
        Self {
            registry,
            states,
            delegate,
        }
    }

    /// The state store, exposed so callers can schedule periodic sweeps.
    pub fn state_store(&self) -> &StateStore {
        &self.states
    }

    /// Build the authorization URL for a provider, issuing a single-use
    /// state value for the attempt.
    pub fn authorization_url(&self, provider: ProviderKind) -> Result<String, Error> {
        let strategy = self.registry.strategy(provider)?;
        // Validate the config before issuing a state so a misconfigured
        // provider leaves nothing behind in the store.
        self.registry.config(provider)?.ensure_configured()?;

        let state = self.states.issue(provider);
        let url = strategy.authorization_url(&state)?;

        debug!("Issued authorization URL for {}", provider);
        Ok(url)
    }

    /// Run the callback state machine for one redirect from a provider.
    ///
    /// Single pass, no retries at this layer. Every failure is returned with
    /// its specific error kind so callers can distinguish replay from expiry
    /// from provider denial.
    pub async fn handle_callback(&self, params: CallbackParams) -> Result<CallbackOutcome, Error> {
        let mut stage = CallbackStage::Received;
        debug!("Callback for {} at {:?}", params.provider, stage);

        // The provider redirected back with an error: fail before touching
        // the network or the state store.
        if let Some(provider_error) = &params.error {
            warn!(
                "{} denied authorization at {:?}: {}",
                params.provider, stage, provider_error
            );
            return Err(callback_error(
                CallbackErrorKind::ProviderDenied,
                &format!("provider redirected with error: {}", provider_error),
            ));
        }

        let code = params.code.as_deref().ok_or_else(|| {
            warn!("{} callback carried no authorization code", params.provider);
            callback_error(
                CallbackErrorKind::MissingAuthorizationCode,
                "callback carried no authorization code",
            )
        })?;

        let issued_for = self.states.consume(&params.state)?;
        if issued_for != params.provider {
            warn!(
                "State value was issued for {} but presented on the {} callback",
                issued_for, params.provider
            );
            return Err(state_error(
                StateErrorKind::NotFound,
                "state value was issued for a different provider",
            ));
        }
        stage = CallbackStage::StateValidated;
        debug!("Callback for {} at {:?}", params.provider, stage);

        let strategy = self.registry.strategy(params.provider)?;

        let tokens = strategy.exchange_code(code).await?;
        stage = CallbackStage::TokenExchanged;
        debug!("Callback for {} at {:?}", params.provider, stage);

        let profile = strategy.fetch_profile(&tokens).await?;
        stage = CallbackStage::ProfileFetched;
        debug!("Callback for {} at {:?}", params.provider, stage);

        let session = self.delegate.login_with_profile(&profile).await?;
        stage = CallbackStage::Delegated;
        debug!("Callback for {} at {:?}", params.provider, stage);

        stage = CallbackStage::Succeeded;
        info!(
            "Third-party login succeeded for {} user {} at {:?}",
            profile.provider, profile.external_id, stage
        );

        Ok(CallbackOutcome { profile, session })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    struct StubDelegate;

    #[async_trait]
    impl LoginDelegate for StubDelegate {
        async fn login_with_profile(
            &self,
            _profile: &CanonicalProfile,
        ) -> Result<SessionResult, Error> {
            Ok(SessionResult {
                session_token: "session".to_string(),
            })
        }
    }

    fn empty_flow() -> AuthFlow {
        AuthFlow::new(
            Arc::new(Registry::new(vec![]).unwrap()),
            Arc::new(StubDelegate),
        )
    }

    #[tokio::test]
    async fn test_provider_denied_short_circuits() {
        let flow = empty_flow();
        let err = flow
            .handle_callback(CallbackParams {
                provider: ProviderKind::Github,
                code: Some("code".to_string()),
                state: "state".to_string(),
                error: Some("access_denied".to_string()),
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::Callback(CallbackErrorKind::ProviderDenied)
        );
    }

    #[tokio::test]
    async fn test_missing_code() {
        let flow = empty_flow();
        let err = flow
            .handle_callback(CallbackParams {
                provider: ProviderKind::Github,
                code: None,
                state: "state".to_string(),
                error: None,
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.error_kind,
            ErrorKind::Callback(CallbackErrorKind::MissingAuthorizationCode)
        );
    }

    #[tokio::test]
    async fn test_unknown_state() {
        let flow = empty_flow();
        let err = flow
            .handle_callback(CallbackParams {
                provider: ProviderKind::Github,
                code: Some("code".to_string()),
                state: "never_issued".to_string(),
                error: None,
            })
            .await
            .unwrap_err();

        assert_eq!(err.error_kind, ErrorKind::State(StateErrorKind::NotFound));
    }
}
