//! Waypass core - authentication sessions and route access for app clients.
//!
//! This crate keeps a user's credential session valid across concurrent
//! network calls and gates navigation on session validity:
//! - `auth`: session entity, stores, single-flight token refresh, login/logout
//! - `api`: HTTP clients for the auth endpoints and authorized requests
//! - `navigation`: routes, the access guard, and the router with its
//!   pending-route slot
//! - `config`: persisted application configuration

pub mod api;
pub mod auth;
pub mod config;
pub mod navigation;

pub use api::{ApiClient, ApiError, AuthClient};
pub use auth::{
    AuthError, AuthInterceptor, AuthService, Credentials, CredentialError, Session,
    SessionStore, SessionVault, StoreError,
};
pub use config::Config;
pub use navigation::{AccessDecision, AccessGuard, DenialReason, Route, Router};
