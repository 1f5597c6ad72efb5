use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::api::ApiError;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum CredentialError {
    #[error("Username is required")]
    MissingUsername,

    #[error("Password is required")]
    MissingPassword,

    #[error("Username must be at least {min} characters")]
    UsernameTooShort { min: usize },

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Access token has expired")]
    TokenExpired,

    #[error("No refresh token available - login required")]
    MissingRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Token refresh did not finish within {0:?}")]
    RefreshTimedOut(Duration),

    #[error("Invalid session: {0}")]
    InvalidSession(String),
}

/// Failures of the medium a session is persisted in.
///
/// The platform error is kept as `source` and otherwise treated opaquely.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Failed to read stored session")]
    Read(#[source] BoxError),

    #[error("Failed to write session")]
    Write(#[source] BoxError),

    #[error("Failed to delete stored session")]
    Delete(#[source] BoxError),

    /// The record exists but cannot be decoded. Distinct from "no session".
    #[error("Stored session is corrupt: {0}")]
    Corrupt(String),

    #[error("Session store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl StoreError {
    pub(crate) fn read(err: impl Into<BoxError>) -> Self {
        StoreError::Read(err.into())
    }

    pub(crate) fn write(err: impl Into<BoxError>) -> Self {
        StoreError::Write(err.into())
    }

    pub(crate) fn delete(err: impl Into<BoxError>) -> Self {
        StoreError::Delete(err.into())
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Api(#[from] ApiError),

    /// A refresh failure observed by every request that waited on it.
    #[error(transparent)]
    Refresh(Arc<AuthError>),
}

impl AuthError {
    /// True when the only way forward is a fresh login.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            AuthError::Credential(
                CredentialError::InvalidCredentials
                    | CredentialError::TokenExpired
                    | CredentialError::MissingRefreshToken
                    | CredentialError::RefreshFailed(_)
                    | CredentialError::RefreshTimedOut(_)
                    | CredentialError::InvalidSession(_)
            ) | AuthError::Api(ApiError::Unauthorized)
        ) || matches!(self, AuthError::Refresh(inner) if inner.requires_login())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_login() {
        assert!(AuthError::from(CredentialError::MissingRefreshToken).requires_login());
        assert!(AuthError::from(ApiError::Unauthorized).requires_login());
        assert!(!AuthError::from(ApiError::NotFound("x".to_string())).requires_login());

        let shared = Arc::new(AuthError::from(CredentialError::RefreshFailed("no".to_string())));
        assert!(AuthError::Refresh(shared).requires_login());
        assert!(!AuthError::Refresh(Arc::new(StoreError::Corrupt("x".to_string()).into()))
            .requires_login());
    }
}
