use std::future::Future;

use tokio::sync::RwLock;

use super::{EncryptedFileSessionStore, KeychainSessionStore, Session, StoreError};

/// Session persistence contract.
///
/// Every implementation has the same semantics so they can be swapped
/// without touching callers:
/// - a missing record is `Ok(None)`, never an error
/// - a record that cannot be decoded is `StoreError::Corrupt`
/// - clearing an empty store succeeds
pub trait SessionStore: Send + Sync + 'static {
    /// Read the stored session, if any.
    fn get_current_session(
        &self,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;

    /// Persist `session`, replacing whatever was stored.
    fn save_session(&self, session: &Session)
        -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Remove the stored session.
    fn clear_session(&self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Volatile single-slot store. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    slot: RwLock<Option<Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store already holding `session`.
    pub fn with_session(session: Session) -> Self {
        Self {
            slot: RwLock::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    async fn get_current_session(&self) -> Result<Option<Session>, StoreError> {
        Ok(self.slot.read().await.clone())
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        *self.slot.write().await = Some(session.clone());
        Ok(())
    }

    async fn clear_session(&self) -> Result<(), StoreError> {
        self.slot.write().await.take();
        Ok(())
    }
}

/// A store picked at runtime, e.g. from `Config::session_backend`.
#[derive(Debug)]
pub enum ConfiguredStore {
    Memory(MemorySessionStore),
    Keychain(KeychainSessionStore),
    EncryptedFile(EncryptedFileSessionStore),
}

impl SessionStore for ConfiguredStore {
    async fn get_current_session(&self) -> Result<Option<Session>, StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.get_current_session().await,
            ConfiguredStore::Keychain(store) => store.get_current_session().await,
            ConfiguredStore::EncryptedFile(store) => store.get_current_session().await,
        }
    }

    async fn save_session(&self, session: &Session) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.save_session(session).await,
            ConfiguredStore::Keychain(store) => store.save_session(session).await,
            ConfiguredStore::EncryptedFile(store) => store.save_session(session).await,
        }
    }

    async fn clear_session(&self) -> Result<(), StoreError> {
        match self {
            ConfiguredStore::Memory(store) => store.clear_session().await,
            ConfiguredStore::Keychain(store) => store.clear_session().await,
            ConfiguredStore::EncryptedFile(store) => store.clear_session().await,
        }
    }
}
