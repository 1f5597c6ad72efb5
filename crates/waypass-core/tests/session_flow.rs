//! Login interruption and resumption across guard, router and auth service.

use std::sync::{Arc, Mutex};

use waypass_core::api::{ApiError, TokenEndpoint, TokenResponse};
use waypass_core::auth::{
    AuthService, ClearReason, Credentials, MemorySessionStore, SessionEvent, SessionVault,
};
use waypass_core::navigation::{AccessGuard, Presenter, Route, Router};

struct FakeEndpoint;

impl TokenEndpoint for FakeEndpoint {
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, ApiError> {
        Ok(TokenResponse {
            access_token: "abc".to_string(),
            refresh_token: "r1".to_string(),
            expires_in: 600,
            token_type: "Bearer".to_string(),
            user_id: credentials.username().to_string(),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> Result<TokenResponse, ApiError> {
        Err(ApiError::Unauthorized)
    }

    async fn logout(&self, _access_token: &str) -> Result<(), ApiError> {
        Ok(())
    }
}

#[derive(Default)]
struct Screens {
    shown: Mutex<Vec<Route>>,
}

impl Presenter for Screens {
    fn present(&self, route: &Route) {
        self.shown.lock().unwrap().push(route.clone());
    }
}

#[tokio::test]
async fn test_denied_navigation_resumes_after_login() {
    let vault = Arc::new(SessionVault::new(MemorySessionStore::new()));
    let mut events = vault.subscribe();
    let screens = Arc::new(Screens::default());
    let router = Router::new(AccessGuard::new(Arc::clone(&vault)), Arc::clone(&screens));
    let auth = AuthService::new(Arc::clone(&vault), Arc::new(FakeEndpoint));

    // Deep link to a protected screen while logged out
    assert_eq!(router.navigate(Route::profile("user123")).await, Route::Login);
    assert_eq!(router.pending_route(), Some(Route::profile("user123")));

    auth.login(&Credentials::new("user123", "password1"))
        .await
        .unwrap();
    assert_eq!(router.resume_after_login().await, Route::profile("user123"));
    assert_eq!(router.restore_pending_route(), None);

    auth.logout().await.unwrap();
    assert_eq!(router.navigate(Route::Home).await, Route::Login);

    assert_eq!(
        *screens.shown.lock().unwrap(),
        vec![Route::Login, Route::profile("user123"), Route::Login]
    );
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::Saved {
            user_id: "user123".to_string()
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        SessionEvent::Cleared {
            reason: ClearReason::Logout
        }
    );
}

#[tokio::test]
async fn test_public_screens_reachable_while_logged_out() {
    let vault = Arc::new(SessionVault::new(MemorySessionStore::new()));
    let router = Router::new(AccessGuard::new(vault), Screens::default());

    for route in [
        Route::Login,
        Route::Signup,
        Route::ForgotPassword,
        Route::NotFound {
            path: "/missing".to_string(),
        },
    ] {
        assert_eq!(router.navigate(route.clone()).await, route);
    }
    assert_eq!(router.pending_route(), None);
}
