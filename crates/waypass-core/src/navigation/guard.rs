use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use super::{AccessDecision, DenialReason, Route};
use crate::auth::{SessionStatus, SessionStore, SessionVault};

/// Decides whether a route is reachable with the current session.
///
/// Fails closed: a store that cannot be read counts as "no session".
/// Checking a protected route with an expired session clears it.
pub struct AccessGuard<S> {
    vault: Arc<SessionVault<S>>,
}

impl<S> Clone for AccessGuard<S> {
    fn clone(&self) -> Self {
        Self {
            vault: Arc::clone(&self.vault),
        }
    }
}

impl<S: SessionStore> AccessGuard<S> {
    pub fn new(vault: Arc<SessionVault<S>>) -> Self {
        Self { vault }
    }

    pub async fn can_access(&self, route: &Route) -> AccessDecision {
        if !route.requires_auth() {
            return AccessDecision::Allowed;
        }

        match self.vault.check(Utc::now()).await {
            Ok(SessionStatus::Valid(_)) => AccessDecision::Allowed,
            Ok(SessionStatus::Missing) => {
                debug!(route = %route, "No session, access denied");
                AccessDecision::Denied(DenialReason::Unauthenticated)
            }
            Ok(SessionStatus::Expired) => {
                debug!(route = %route, "Session expired, access denied");
                AccessDecision::Denied(DenialReason::Unauthenticated)
            }
            Err(e) => {
                warn!(route = %route, error = %e, "Session store unreadable, denying access");
                AccessDecision::Denied(DenialReason::Unauthenticated)
            }
        }
    }
}
