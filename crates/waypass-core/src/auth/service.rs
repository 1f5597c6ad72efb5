use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::{AuthError, ClearReason, CredentialError, Credentials, Session, SessionStore, SessionVault};
use crate::api::{ApiError, TokenEndpoint};

/// Login and logout against the auth endpoint, keeping the vault in step.
pub struct AuthService<S, E> {
    vault: Arc<SessionVault<S>>,
    endpoint: Arc<E>,
}

impl<S: SessionStore, E: TokenEndpoint> AuthService<S, E> {
    pub fn new(vault: Arc<SessionVault<S>>, endpoint: Arc<E>) -> Self {
        Self { vault, endpoint }
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        credentials.validate()?;

        let response = self.endpoint.login(credentials).await.map_err(|e| match e {
            ApiError::Unauthorized => AuthError::from(CredentialError::InvalidCredentials),
            other => AuthError::from(other),
        })?;
        let session = Session::from_token_response(response, Utc::now())?;
        self.vault.save(session.clone()).await?;

        info!(user_id = %session.user_id(), "Logged in");
        Ok(session)
    }

    /// Invalidate server-side (best effort) and discard local state.
    pub async fn logout(&self) -> Result<(), AuthError> {
        match self.vault.current().await {
            Ok(Some(session)) => {
                if let Err(e) = self.endpoint.logout(session.access_token()).await {
                    warn!(error = %e, "Server-side logout failed, discarding local session anyway");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Could not read session during logout"),
        }

        self.vault.clear(ClearReason::Logout).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::api::TokenResponse;
    use crate::auth::MemorySessionStore;

    #[derive(Default)]
    struct FakeEndpoint {
        logins: AtomicUsize,
        logouts: AtomicUsize,
        reject: bool,
    }

    impl TokenEndpoint for FakeEndpoint {
        async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, ApiError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                return Err(ApiError::Unauthorized);
            }
            Ok(TokenResponse {
                access_token: "abc".to_string(),
                refresh_token: "r1".to_string(),
                expires_in: 900,
                token_type: "Bearer".to_string(),
                user_id: credentials.username().to_string(),
            })
        }

        async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, ApiError> {
            Err(ApiError::Unauthorized)
        }

        async fn logout(&self, _access_token: &str) -> Result<(), ApiError> {
            self.logouts.fetch_add(1, Ordering::SeqCst);
            Err(ApiError::ServerError("down".to_string()))
        }
    }

    fn service(endpoint: FakeEndpoint) -> AuthService<MemorySessionStore, FakeEndpoint> {
        AuthService::new(
            Arc::new(SessionVault::new(MemorySessionStore::new())),
            Arc::new(endpoint),
        )
    }

    #[tokio::test]
    async fn test_login_saves_session() {
        let service = service(FakeEndpoint::default());
        let session = service
            .login(&Credentials::new("alice", "password1"))
            .await
            .unwrap();

        assert_eq!(session.user_id(), "alice");
        assert!(session.is_valid());
        assert_eq!(service.vault.current().await.unwrap(), Some(session));
    }

    #[tokio::test]
    async fn test_invalid_form_never_reaches_server() {
        let service = service(FakeEndpoint::default());
        let err = service.login(&Credentials::new("", "password1")).await.unwrap_err();

        assert!(matches!(err, AuthError::Credential(CredentialError::MissingUsername)));
        assert_eq!(service.endpoint.logins.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejected_login_is_invalid_credentials() {
        let service = service(FakeEndpoint {
            reject: true,
            ..FakeEndpoint::default()
        });
        let err = service
            .login(&Credentials::new("alice", "password1"))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::Credential(CredentialError::InvalidCredentials)));
        assert!(service.vault.current().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let service = service(FakeEndpoint::default());
        service
            .login(&Credentials::new("alice", "password1"))
            .await
            .unwrap();

        service.logout().await.unwrap();
        assert_eq!(service.endpoint.logouts.load(Ordering::SeqCst), 1);
        assert!(service.vault.current().await.unwrap().is_none());

        // Nothing to revoke the second time
        service.logout().await.unwrap();
        assert_eq!(service.endpoint.logouts.load(Ordering::SeqCst), 1);
    }
}
