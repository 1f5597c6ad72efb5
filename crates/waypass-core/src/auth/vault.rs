use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info};

use super::{Session, SessionStore, StoreError};

/// Buffer size for the session event channel.
/// Slow subscribers only miss events, they never block writers.
const EVENT_CHANNEL_CAPACITY: usize = 16;

/// Why a session was removed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearReason {
    Logout,
    Expired,
    RefreshFailed,
}

/// Change notifications for observers (e.g. a UI prompting re-login).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Saved { user_id: String },
    Cleared { reason: ClearReason },
}

/// Result of an atomic validity check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    Missing,
    /// The session had expired and has been cleared.
    Expired,
    Valid(Session),
}

/// Serializes all access to a `SessionStore`.
///
/// Every read-modify-write on the session runs while holding the one lock.
/// Sequences that must await something else in between (a token refresh)
/// finish with `save_if_current` / `clear_if_current`, which only write
/// when the session they started from is still the stored one.
pub struct SessionVault<S> {
    store: S,
    lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl<S: SessionStore> SessionVault<S> {
    pub fn new(store: S) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            store,
            lock: Mutex::new(()),
            events,
        }
    }

    /// The wrapped store. Bypasses the vault's lock.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Register for session change events. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub async fn current(&self) -> Result<Option<Session>, StoreError> {
        let _guard = self.lock.lock().await;
        self.store.get_current_session().await
    }

    pub async fn save(&self, session: Session) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.store.save_session(&session).await?;
        debug!(user_id = %session.user_id(), expires_at = %session.expires_at(), "Session saved");
        self.notify(SessionEvent::Saved {
            user_id: session.user_id().to_string(),
        });
        Ok(())
    }

    pub async fn clear(&self, reason: ClearReason) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.store.clear_session().await?;
        info!(?reason, "Session cleared");
        self.notify(SessionEvent::Cleared { reason });
        Ok(())
    }

    /// Replace `expected` with `session`, unless the stored session has
    /// changed since `expected` was read. Returns whether the write happened.
    pub async fn save_if_current(
        &self,
        expected: &Session,
        session: Session,
    ) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        if self.store.get_current_session().await?.as_ref() != Some(expected) {
            debug!(user_id = %expected.user_id(), "Stored session changed, skipping save");
            return Ok(false);
        }
        self.store.save_session(&session).await?;
        debug!(user_id = %session.user_id(), expires_at = %session.expires_at(), "Session replaced");
        self.notify(SessionEvent::Saved {
            user_id: session.user_id().to_string(),
        });
        Ok(true)
    }

    /// Clear the store only while it still holds `expected`.
    pub async fn clear_if_current(
        &self,
        expected: &Session,
        reason: ClearReason,
    ) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        if self.store.get_current_session().await?.as_ref() != Some(expected) {
            debug!(?reason, "Stored session changed, skipping clear");
            return Ok(false);
        }
        self.store.clear_session().await?;
        info!(?reason, "Session cleared");
        self.notify(SessionEvent::Cleared { reason });
        Ok(true)
    }

    /// Read the session and clear it if it has expired at `now`, as one step.
    pub async fn check(&self, now: DateTime<Utc>) -> Result<SessionStatus, StoreError> {
        let _guard = self.lock.lock().await;
        match self.store.get_current_session().await? {
            None => Ok(SessionStatus::Missing),
            Some(session) if session.is_valid_at(now) => Ok(SessionStatus::Valid(session)),
            Some(session) => {
                self.store.clear_session().await?;
                info!(user_id = %session.user_id(), "Expired session cleared");
                self.notify(SessionEvent::Cleared {
                    reason: ClearReason::Expired,
                });
                Ok(SessionStatus::Expired)
            }
        }
    }

    fn notify(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
