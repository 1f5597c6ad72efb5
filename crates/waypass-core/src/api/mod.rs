//! HTTP client module for the authentication service and authorized calls.
//!
//! This module provides:
//! - `AuthClient`: login, token refresh and logout over the wire
//! - `ApiClient`: authorized requests that survive one token refresh
//!
//! Credentials are sent as `Authorization: Bearer <accessToken>`.

pub mod client;
pub mod error;

pub use client::{ApiClient, AuthClient, TokenEndpoint, TokenResponse};
pub use error::ApiError;
