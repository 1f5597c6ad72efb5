//! HTTP clients for the authentication service and authorized API calls.
//!
//! `AuthClient` speaks the login/refresh/logout wire contract.
//! `ApiClient` sends arbitrary requests through an `AuthInterceptor`,
//! giving each request at most one 401 -> refresh -> retry cycle.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Method, Request, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ApiError;
use crate::auth::{AuthError, AuthInterceptor, Credentials, SessionStore};

// ============================================================================
// Constants
// ============================================================================

const LOGIN_PATH: &str = "auth/login";
const REFRESH_PATH: &str = "auth/refresh";
const LOGOUT_PATH: &str = "auth/logout";

/// Response body shared by login and refresh.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
    pub user_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Remote operations that mint or revoke tokens.
pub trait TokenEndpoint: Send + Sync + 'static {
    fn login(
        &self,
        credentials: &Credentials,
    ) -> impl Future<Output = Result<TokenResponse, ApiError>> + Send;

    /// Exchange a refresh token for a new token pair. The old refresh token
    /// is no longer usable afterwards.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenResponse, ApiError>> + Send;

    fn logout(&self, access_token: &str) -> impl Future<Output = Result<(), ApiError>> + Send;
}

/// Check if response is successful, returning an error with body if not.
async fn check_response(response: Response) -> Result<Response, ApiError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::from_status(status, &body))
    }
}

fn build_client(timeout: Duration) -> Result<Client, ApiError> {
    Ok(Client::builder().timeout(timeout).build()?)
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Client for the authentication endpoints.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct AuthClient {
    client: Client,
    base_url: String,
}

impl AuthClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
        })
    }

    async fn post_token<B: Serialize>(&self, path: &str, body: &B) -> Result<TokenResponse, ApiError> {
        let url = join_url(&self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;
        let response = check_response(response).await?;

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("token response from {}: {}", url, e)))
    }
}

impl TokenEndpoint for AuthClient {
    async fn login(&self, credentials: &Credentials) -> Result<TokenResponse, ApiError> {
        debug!(username = %credentials.username(), "Sending login request");
        self.post_token(LOGIN_PATH, credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, ApiError> {
        self.post_token(REFRESH_PATH, &RefreshRequest { refresh_token })
            .await
    }

    async fn logout(&self, access_token: &str) -> Result<(), ApiError> {
        let url = join_url(&self.base_url, LOGOUT_PATH);
        let response = self
            .client
            .post(&url)
            .bearer_auth(access_token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        check_response(response).await?;
        Ok(())
    }
}

/// Client for authorized API calls.
pub struct ApiClient<S, E> {
    client: Client,
    base_url: String,
    interceptor: Arc<AuthInterceptor<S, E>>,
}

impl<S: SessionStore, E: TokenEndpoint> ApiClient<S, E> {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        interceptor: Arc<AuthInterceptor<S, E>>,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into(),
            interceptor,
        })
    }

    /// Build a request for `path` relative to the API base URL.
    pub fn request(&self, method: Method, path: &str) -> Result<Request, ApiError> {
        Ok(self
            .client
            .request(method, join_url(&self.base_url, path))
            .build()?)
    }

    /// Send `request` with credentials attached.
    ///
    /// On 401 the interceptor decides whether to retry; the request is then
    /// re-adapted and sent exactly once more. Any other failure status is
    /// returned as the matching `ApiError`.
    pub async fn execute(&self, request: Request) -> Result<Response, AuthError> {
        let replay = request.try_clone();
        let (sent, response) = self.send_adapted(request).await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(check_response(response).await?);
        }

        let status = response.status();
        let body = response.bytes().await.map_err(ApiError::from)?;
        let should_retry = self
            .interceptor
            .retry(&sent, status, &body)
            .await
            .map_err(AuthError::Refresh)?;

        match (should_retry, replay) {
            (true, Some(original)) => {
                debug!(url = %original.url(), "Retrying request with refreshed credentials");
                let (_, response) = self.send_adapted(original).await?;
                Ok(check_response(response).await?)
            }
            (true, None) => {
                warn!(url = %sent.url(), "Request body cannot be replayed after refresh");
                Err(ApiError::Unauthorized.into())
            }
            (false, _) => Err(ApiError::Unauthorized.into()),
        }
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, AuthError> {
        let request = self.request(Method::GET, path)?;
        let url = request.url().to_string();
        let response = self.execute(request).await?;
        let text = response.text().await.map_err(ApiError::from)?;
        serde_json::from_str(&text).map_err(|e| {
            AuthError::from(ApiError::InvalidResponse(format!("{}: {}", url, e)))
        })
    }

    /// Adapt and send, keeping a body-less copy of what went over the wire.
    async fn send_adapted(&self, request: Request) -> Result<(Request, Response), AuthError> {
        let adapted = self.interceptor.adapt(request).await?;

        let mut sent = Request::new(adapted.method().clone(), adapted.url().clone());
        *sent.headers_mut() = adapted.headers().clone();

        let response = self.client.execute(adapted).await.map_err(ApiError::from)?;
        Ok((sent, response))
    }
}
