//! Bearer credential injection and single-flight token refresh.
//!
//! Many requests can fail with 401 in the same instant (typically right after
//! the access token expires). Refresh tokens rotate, so a second concurrent
//! refresh call could burn the token the first one is about to use. The
//! interceptor therefore keeps at most one refresh in flight: the first
//! caller starts it, everyone else awaits the same shared handle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Request, StatusCode};
use tracing::{debug, info, warn};

use super::{AuthError, ClearReason, CredentialError, Session, SessionStore, SessionVault};
use crate::api::{ApiError, TokenEndpoint};

type RefreshOutcome = Result<(), Arc<AuthError>>;
type InFlight = Shared<BoxFuture<'static, RefreshOutcome>>;

pub struct AuthInterceptor<S, E> {
    vault: Arc<SessionVault<S>>,
    endpoint: Arc<E>,
    in_flight: Arc<Mutex<Option<InFlight>>>,
    /// Successful refreshes so far. Bumped under the `in_flight` lock.
    completed: Arc<AtomicU64>,
    refresh_timeout: Option<Duration>,
}

impl<S: SessionStore, E: TokenEndpoint> AuthInterceptor<S, E> {
    pub fn new(vault: Arc<SessionVault<S>>, endpoint: Arc<E>) -> Self {
        Self {
            vault,
            endpoint,
            in_flight: Arc::new(Mutex::new(None)),
            completed: Arc::new(AtomicU64::new(0)),
            refresh_timeout: None,
        }
    }

    /// Give up on a refresh call that takes longer than `timeout`.
    /// Without one, waiters block until the endpoint answers.
    pub fn with_refresh_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    pub fn vault(&self) -> &Arc<SessionVault<S>> {
        &self.vault
    }

    /// Attach `Authorization: Bearer <accessToken>` when a session exists.
    ///
    /// Without a session the request passes through untouched.
    pub async fn adapt(&self, mut request: Request) -> Result<Request, AuthError> {
        let Some(session) = self.vault.current().await? else {
            return Ok(request);
        };

        let mut value = HeaderValue::from_str(&format!("Bearer {}", session.access_token()))
            .map_err(|_| {
                CredentialError::InvalidSession("access token is not a valid header value".to_string())
            })?;
        value.set_sensitive(true);
        request.headers_mut().insert(AUTHORIZATION, value);
        Ok(request)
    }

    /// Decide whether a failed request should be sent again.
    ///
    /// Only 401 triggers anything. The refresh is shared by every concurrent
    /// caller; on failure the session is cleared and all of them receive the
    /// same error. Callers must not retry a request more than once.
    pub async fn retry(
        &self,
        request: &Request,
        status: StatusCode,
        body: &[u8],
    ) -> Result<bool, Arc<AuthError>> {
        if status != StatusCode::UNAUTHORIZED {
            return Ok(false);
        }
        debug!(url = %request.url(), body_len = body.len(), "Request unauthorized");
        let seen = self.completed.load(Ordering::SeqCst);

        // Someone already rotated the credentials this request was sent with
        if let Ok(Some(session)) = self.vault.current().await {
            if bearer_token(request.headers()) != Some(session.access_token()) {
                debug!("Credentials changed since request was sent, retrying without refresh");
                return Ok(true);
            }
        }

        self.join_or_start(seen).await.map(|()| true)
    }

    fn join_or_start(&self, seen: u64) -> InFlight {
        let mut slot = lock_slot(&self.in_flight);
        if let Some(existing) = slot.as_ref() {
            debug!("Joining in-flight token refresh");
            return existing.clone();
        }
        if self.completed.load(Ordering::SeqCst) != seen {
            debug!("Token refresh finished while checking credentials");
            return futures::future::ready::<RefreshOutcome>(Ok(())).boxed().shared();
        }

        let refresh = Self::refresh_once(
            Arc::clone(&self.vault),
            Arc::clone(&self.endpoint),
            self.refresh_timeout,
            Arc::clone(&self.in_flight),
            Arc::clone(&self.completed),
        )
        .boxed()
        .shared();
        *slot = Some(refresh.clone());
        refresh
    }

    async fn refresh_once(
        vault: Arc<SessionVault<S>>,
        endpoint: Arc<E>,
        timeout: Option<Duration>,
        in_flight: Arc<Mutex<Option<InFlight>>>,
        completed: Arc<AtomicU64>,
    ) -> RefreshOutcome {
        let outcome = Self::refresh_cycle(&vault, endpoint.as_ref(), timeout).await;

        // Reset only after the session is settled so the next 401 starts clean
        let mut slot = lock_slot(&in_flight);
        if outcome.is_ok() {
            completed.fetch_add(1, Ordering::SeqCst);
        }
        slot.take();
        outcome.map_err(Arc::new)
    }

    /// Refresh the stored session and write the result back, provided the
    /// session is still the one the refresh started from.
    async fn refresh_cycle(
        vault: &SessionVault<S>,
        endpoint: &E,
        timeout: Option<Duration>,
    ) -> Result<(), AuthError> {
        let Some(started) = vault.current().await? else {
            return Err(CredentialError::MissingRefreshToken.into());
        };

        let saved = match Self::refresh_session(&started, endpoint, timeout).await {
            Ok(session) => vault
                .save_if_current(&started, session)
                .await
                .map_err(AuthError::from),
            Err(err) => Err(err),
        };

        match saved {
            Ok(true) => {
                info!(user_id = %started.user_id(), "Token refresh succeeded");
                Ok(())
            }
            // Logged out or logged in again while the call was in flight
            Ok(false) => match vault.current().await? {
                Some(_) => {
                    debug!("Session replaced during token refresh, using the newer credentials");
                    Ok(())
                }
                None => {
                    info!("Session ended during token refresh, discarding refreshed tokens");
                    Err(CredentialError::InvalidSession(
                        "session ended during token refresh".to_string(),
                    )
                    .into())
                }
            },
            Err(err) => {
                warn!(error = %err, "Token refresh failed, clearing session");
                match vault.clear_if_current(&started, ClearReason::RefreshFailed).await {
                    Ok(true) => {}
                    Ok(false) => debug!("Session replaced during token refresh, keeping it"),
                    Err(clear_err) => {
                        warn!(error = %clear_err, "Failed to clear session after refresh failure")
                    }
                }
                Err(err)
            }
        }
    }

    async fn refresh_session(
        started: &Session,
        endpoint: &E,
        timeout: Option<Duration>,
    ) -> Result<Session, AuthError> {
        let refresh_token = started
            .refresh_token()
            .ok_or(CredentialError::MissingRefreshToken)?;

        info!("Refreshing access token");
        let call = endpoint.refresh(refresh_token);
        let response = match timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| CredentialError::RefreshTimedOut(limit))?,
            None => call.await,
        };

        let response = response.map_err(|e| match e {
            ApiError::Unauthorized => {
                AuthError::from(CredentialError::RefreshFailed("refresh token rejected".to_string()))
            }
            other => AuthError::from(other),
        })?;

        Ok(Session::from_token_response(response, Utc::now())?)
    }
}

fn lock_slot(slot: &Mutex<Option<InFlight>>) -> MutexGuard<'_, Option<InFlight>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The bearer credential a request was sent with, if any.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}
