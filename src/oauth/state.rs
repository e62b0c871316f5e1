//! Anti-CSRF state management for the authorization-code flow.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use rand::Rng;

use crate::error::{state_error, Error, StateErrorKind};
use crate::oauth::ProviderKind;

/// A pending (or consumed) authorization attempt.
#[derive(Debug, Clone)]
struct AuthorizationState {
    provider: ProviderKind,
    created_at: DateTime<Utc>,
    consumed: bool,
}

/// Store of single-use anti-CSRF state values.
///
/// Issues cryptographically random values correlated to a pending
/// authorization attempt and consumes each value at most once. Consumed
/// entries are kept as tombstones until their TTL passes so a replayed value
/// is reported as replay, not as unknown.
#[derive(Clone)]
pub struct StateStore {
    states: Arc<Mutex<HashMap<String, AuthorizationState>>>,
    ttl: Duration,
}

impl StateStore {
    /// Create a new state store with the default TTL of 10 minutes.
    pub fn new() -> Self {
        Self::with_ttl(Duration::minutes(10))
    }

    /// Create a new state store with a custom TTL.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            states: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    /// Generate a new state value for the given provider and store it.
    ///
    /// # Returns
    ///
    /// The generated state value (32 random bytes, hex encoded).
    pub fn issue(&self, provider: ProviderKind) -> String {
        let state = Self::generate_value();
        let data = AuthorizationState {
            provider,
            created_at: Utc::now(),
            consumed: false,
        };

        let mut states = self.states.lock().unwrap();
        states.insert(state.clone(), data);

        state
    }

    /// Validate and consume a state value, at most once.
    ///
    /// The consumed check and the mark happen under one lock, so two
    /// concurrent callbacks presenting the same value cannot both succeed.
    ///
    /// # Returns
    ///
    /// The provider the state was issued for, or the specific failure:
    /// `NotFound` for unknown values, `Expired` past the TTL, and
    /// `AlreadyConsumed` for replay.
    pub fn consume(&self, state: &str) -> Result<ProviderKind, Error> {
        let mut states = self.states.lock().unwrap();
        let now = Utc::now();

        let data = states.get_mut(state).ok_or_else(|| {
            state_error(StateErrorKind::NotFound, "state value was never issued")
        })?;

        if now - data.created_at > self.ttl {
            // Expired entries are rejected whether or not they were consumed;
            // evict on the way out.
            states.remove(state);
            return Err(state_error(StateErrorKind::Expired, "state value expired"));
        }

        if data.consumed {
            return Err(state_error(
                StateErrorKind::AlreadyConsumed,
                "state value replayed",
            ));
        }

        data.consumed = true;
        Ok(data.provider)
    }

    /// Clean up expired states and tombstones.
    ///
    /// Should be called periodically to prevent unbounded growth.
    pub fn cleanup_expired(&self) {
        let mut states = self.states.lock().unwrap();
        let now = Utc::now();
        states.retain(|_, data| now - data.created_at <= self.ttl);
    }

    /// Generate a cryptographically random state value.
    fn generate_value() -> String {
        let random_bytes: [u8; 32] = rand::thread_rng().gen();
        hex::encode(random_bytes)
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}
