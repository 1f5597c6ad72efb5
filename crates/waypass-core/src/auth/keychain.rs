use std::fmt;
use std::sync::Arc;

use keyring::Entry;
use tracing::debug;

use super::{Session, SessionStore, StoreError};

/// Keychain service name for stored sessions
pub const SERVICE_NAME: &str = "waypass";

/// Name of the single record holding the serialized session
pub const SESSION_ACCOUNT: &str = "session";

/// Session store backed by the OS secure credential store.
///
/// The session is written as opaque JSON bytes under one named record.
/// Keychain calls block, so they run on the blocking pool.
#[derive(Clone)]
pub struct KeychainSessionStore {
    entry: Arc<Entry>,
    service: String,
}

impl KeychainSessionStore {
    /// Open the default `waypass`/`session` record.
    pub fn new() -> Result<Self, StoreError> {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Result<Self, StoreError> {
        let entry = Entry::new(service, SESSION_ACCOUNT).map_err(StoreError::read)?;
        Ok(Self {
            entry: Arc::new(entry),
            service: service.to_string(),
        })
    }

    /// Access the underlying keyring entry (tests inject failures through it).
    pub fn entry(&self) -> &Entry {
        &self.entry
    }
}

impl fmt::Debug for KeychainSessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeychainSessionStore")
            .field("service", &self.service)
            .field("account", &SESSION_ACCOUNT)
            .finish()
    }
}

impl SessionStore for KeychainSessionStore {
    async fn get_current_session(&self) -> Result<Option<Session>, StoreError> {
        let entry = Arc::clone(&self.entry);
        let secret = tokio::task::spawn_blocking(move || entry.get_secret()).await?;

        match secret {
            Ok(bytes) => {
                let session = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                Ok(Some(session))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(keyring::Error::BadEncoding(_)) => {
                Err(StoreError::Corrupt("keychain record is not valid data".to_string()))
            }
            Err(e) => Err(StoreError::read(e)),
        }
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(session).map_err(StoreError::write)?;
        let entry = Arc::clone(&self.entry);
        tokio::task::spawn_blocking(move || entry.set_secret(&bytes))
            .await?
            .map_err(StoreError::write)?;
        debug!(service = %self.service, "Session written to keychain");
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), StoreError> {
        let entry = Arc::clone(&self.entry);
        match tokio::task::spawn_blocking(move || entry.delete_credential()).await? {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::delete(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use keyring::mock::MockCredential;

    fn mock_store() -> KeychainSessionStore {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        KeychainSessionStore::with_service("waypass-test").unwrap()
    }

    fn mock(store: &KeychainSessionStore) -> &MockCredential {
        store
            .entry()
            .get_credential()
            .downcast_ref::<MockCredential>()
            .expect("mock credential")
    }

    #[tokio::test]
    async fn test_missing_record_is_no_session() {
        let store = mock_store();
        assert!(store.get_current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_then_read() {
        let store = mock_store();
        let session = Session::new("u1", "abc", "r1", Utc::now() + Duration::hours(1));
        store.save_session(&session).await.unwrap();

        let loaded = store.get_current_session().await.unwrap();
        assert_eq!(loaded, Some(session));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = mock_store();
        let session = Session::new("u1", "abc", "r1", Utc::now());
        store.save_session(&session).await.unwrap();

        store.clear_session().await.unwrap();
        store.clear_session().await.unwrap();
        assert!(store.get_current_session().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_garbage_record_is_corrupt_not_missing() {
        let store = mock_store();
        store.entry().set_secret(b"not json").unwrap();

        assert!(matches!(
            store.get_current_session().await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_platform_failure_is_read_error() {
        let store = mock_store();
        mock(&store).set_error(keyring::Error::PlatformFailure("locked".into()));

        assert!(matches!(
            store.get_current_session().await,
            Err(StoreError::Read(_))
        ));
    }
}
