use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use super::{AccessDecision, AccessGuard, DenialReason, Route};
use crate::auth::SessionStore;

/// Presentation layer hook: shows the screen for a route.
pub trait Presenter: Send + Sync {
    fn present(&self, route: &Route);
}

impl<P: Presenter + ?Sized> Presenter for Arc<P> {
    fn present(&self, route: &Route) {
        (**self).present(route)
    }
}

/// Maps a raw deep-link URL onto a route. Must be pure.
pub trait RouteResolver {
    fn resolve(&self, url: &str) -> Route;
}

impl<F> RouteResolver for F
where
    F: Fn(&str) -> Route,
{
    fn resolve(&self, url: &str) -> Route {
        self(url)
    }
}

/// Holds at most one route to resume after login.
///
/// Saving overwrites; taking empties the slot.
#[derive(Debug, Default)]
pub struct PendingRouteSlot {
    slot: Mutex<Option<Route>>,
}

impl PendingRouteSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `route`, returning whatever it replaced.
    pub fn save(&self, route: Route) -> Option<Route> {
        self.lock().replace(route)
    }

    /// Read and clear in one step.
    pub fn take(&self) -> Option<Route> {
        self.lock().take()
    }

    pub fn peek(&self) -> Option<Route> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Route>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dispatches routes, redirecting to login when the session is missing.
pub struct Router<S, P> {
    guard: AccessGuard<S>,
    presenter: P,
    pending: PendingRouteSlot,
}

impl<S: SessionStore, P: Presenter> Router<S, P> {
    pub fn new(guard: AccessGuard<S>, presenter: P) -> Self {
        Self {
            guard,
            presenter,
            pending: PendingRouteSlot::new(),
        }
    }

    /// Show `route` if allowed, otherwise redirect. Returns the route that
    /// was actually presented.
    pub async fn navigate(&self, route: Route) -> Route {
        let destination = match self.guard.can_access(&route).await {
            AccessDecision::Allowed => route,
            AccessDecision::Denied(DenialReason::Unauthenticated) => {
                debug!(route = %route, "Saving route to resume after login");
                self.save_intended_route(route);
                Route::Login
            }
            AccessDecision::Denied(DenialReason::Locked) => Route::Unauthorized {
                requested: Box::new(route),
            },
            AccessDecision::Denied(reason) => {
                debug!(route = %route, ?reason, "No dedicated handling for denial, going home");
                Route::Home
            }
        };

        info!(route = %destination, "Presenting route");
        self.presenter.present(&destination);
        destination
    }

    /// Resolve a deep link and navigate to it.
    pub async fn navigate_url(&self, url: &str, resolver: &impl RouteResolver) -> Route {
        let route = resolver.resolve(url);
        debug!(url = url, route = %route, "Resolved deep link");
        self.navigate(route).await
    }

    pub fn save_intended_route(&self, route: Route) {
        if let Some(previous) = self.pending.save(route) {
            debug!(route = %previous, "Discarding earlier pending route");
        }
    }

    pub fn restore_pending_route(&self) -> Option<Route> {
        self.pending.take()
    }

    /// Route waiting for a login, without consuming it.
    pub fn pending_route(&self) -> Option<Route> {
        self.pending.peek()
    }

    /// After a successful login, continue to the interrupted destination
    /// (or home when there was none).
    pub async fn resume_after_login(&self) -> Route {
        let target = self.restore_pending_route().unwrap_or(Route::Home);
        self.navigate(target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{Duration, Utc};

    use crate::auth::{MemorySessionStore, Session, SessionVault};

    #[derive(Default)]
    struct RecordingPresenter {
        shown: Mutex<Vec<Route>>,
    }

    impl Presenter for RecordingPresenter {
        fn present(&self, route: &Route) {
            self.shown.lock().unwrap().push(route.clone());
        }
    }

    fn router(
        session: Option<Session>,
    ) -> (
        Router<MemorySessionStore, Arc<RecordingPresenter>>,
        Arc<SessionVault<MemorySessionStore>>,
        Arc<RecordingPresenter>,
    ) {
        let store = match session {
            Some(s) => MemorySessionStore::with_session(s),
            None => MemorySessionStore::new(),
        };
        let vault = Arc::new(SessionVault::new(store));
        let presenter = Arc::new(RecordingPresenter::default());
        let router = Router::new(AccessGuard::new(Arc::clone(&vault)), Arc::clone(&presenter));
        (router, vault, presenter)
    }

    fn valid_session() -> Session {
        Session::new("user123", "abc", "r", Utc::now() + Duration::hours(1))
    }

    #[test]
    fn test_slot_overwrites_and_consumes_once() {
        let slot = PendingRouteSlot::new();
        assert_eq!(slot.save(Route::Home), None);
        assert_eq!(slot.save(Route::profile("b")), Some(Route::Home));

        assert_eq!(slot.take(), Some(Route::profile("b")));
        assert_eq!(slot.take(), None);
    }

    #[tokio::test]
    async fn test_save_save_restore_returns_latest() {
        let (router, _, _) = router(None);
        router.save_intended_route(Route::Home);
        router.save_intended_route(Route::Settings { section: None });

        assert_eq!(
            router.restore_pending_route(),
            Some(Route::Settings { section: None })
        );
        assert_eq!(router.restore_pending_route(), None);
    }

    #[tokio::test]
    async fn test_denied_route_saved_and_login_presented() {
        let (router, _, presenter) = router(None);

        let shown = router.navigate(Route::profile("user123")).await;
        assert_eq!(shown, Route::Login);
        assert_eq!(router.pending_route(), Some(Route::profile("user123")));
        assert_eq!(*presenter.shown.lock().unwrap(), vec![Route::Login]);
    }

    #[tokio::test]
    async fn test_allowed_route_presented_without_touching_slot() {
        let (router, _, presenter) = router(Some(valid_session()));

        assert_eq!(router.navigate(Route::Home).await, Route::Home);
        assert_eq!(router.pending_route(), None);
        assert_eq!(*presenter.shown.lock().unwrap(), vec![Route::Home]);
    }

    #[tokio::test]
    async fn test_resume_after_login() {
        let (router, vault, presenter) = router(None);
        router.navigate(Route::profile("user123")).await;

        vault.save(valid_session()).await.unwrap();
        assert_eq!(router.resume_after_login().await, Route::profile("user123"));
        assert_eq!(router.pending_route(), None);

        // Nothing pending the second time
        assert_eq!(router.resume_after_login().await, Route::Home);
        assert_eq!(
            *presenter.shown.lock().unwrap(),
            vec![Route::Login, Route::profile("user123"), Route::Home]
        );
    }

    #[tokio::test]
    async fn test_navigate_url_uses_resolver() {
        let (router, _, _) = router(None);
        let resolver = |url: &str| {
            if url.ends_with("/signup") {
                Route::Signup
            } else {
                Route::NotFound {
                    path: url.to_string(),
                }
            }
        };

        assert_eq!(
            router.navigate_url("app://open/signup", &resolver).await,
            Route::Signup
        );
        assert_eq!(
            router.navigate_url("app://open/zzz", &resolver).await,
            Route::NotFound {
                path: "app://open/zzz".to_string()
            }
        );
        assert_eq!(router.pending_route(), None);
    }
}
