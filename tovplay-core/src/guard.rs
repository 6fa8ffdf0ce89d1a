use crate::jwt;
use crate::storage::StorageError;
use crate::token_store::TokenStore;
use std::sync::Mutex;
use tracing;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessState {
    Unauthenticated,
    Authenticated,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    Login,
    Dashboard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Allow,
    Redirect(Boundary),
}

/// Lazily evaluated route access. State is re-derived from the stored token
/// on every navigation; nothing runs on a timer.
pub struct RouteGuard {
    tokens: TokenStore,
    state: Mutex<AccessState>,
}

impl RouteGuard {
    pub fn new(tokens: TokenStore) -> Self {
        Self {
            tokens,
            state: Mutex::new(AccessState::Unauthenticated),
        }
    }

    pub fn state(&self) -> AccessState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(AccessState::Unauthenticated)
    }

    /// Access check for a protected view. Any outcome other than
    /// `Authenticated` clears the stored token.
    pub fn protected(&self, now: i64) -> Result<RouteDecision, StorageError> {
        let token = self.tokens.get()?;
        let valid = jwt::is_valid(token.as_deref(), now);

        let mut state = self.state.lock().map_err(|_| StorageError::Poisoned)?;
        let next = match (valid, *state) {
            (true, _) => AccessState::Authenticated,
            (false, AccessState::Authenticated) | (false, AccessState::Expired) => {
                AccessState::Expired
            }
            (false, AccessState::Unauthenticated) => AccessState::Unauthenticated,
        };

        if next != *state {
            tracing::debug!("Route access {:?} -> {:?}", *state, next);
        }
        *state = next;
        drop(state);

        match next {
            AccessState::Authenticated => Ok(RouteDecision::Allow),
            AccessState::Expired | AccessState::Unauthenticated => {
                if next == AccessState::Expired {
                    tracing::info!("Session expired, redirecting to login");
                }
                self.tokens.clear()?;
                Ok(RouteDecision::Redirect(Boundary::Login))
            }
        }
    }

    /// Access check for a public-only view such as sign-in. Never touches
    /// storage.
    pub fn public_only(&self, now: i64) -> Result<RouteDecision, StorageError> {
        let token = self.tokens.get()?;
        if jwt::is_valid(token.as_deref(), now) {
            Ok(RouteDecision::Redirect(Boundary::Dashboard))
        } else {
            Ok(RouteDecision::Allow)
        }
    }
}
