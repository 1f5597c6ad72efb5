//! Authentication module for managing user sessions and credentials.
//!
//! This module provides:
//! - `Session`: token-based session with an absolute expiry
//! - `SessionStore`: persistence contract with in-memory, OS keychain and
//!   encrypted-file implementations
//! - `SessionVault`: the single lock every session read-modify-write goes through
//! - `AuthInterceptor`: bearer header injection and single-flight token refresh
//! - `AuthService`: login and logout

pub mod credentials;
pub mod encrypted;
pub mod error;
pub mod interceptor;
pub mod keychain;
pub mod service;
pub mod session;
pub mod store;
pub mod vault;

pub use credentials::Credentials;
pub use encrypted::EncryptedFileSessionStore;
pub use error::{AuthError, CredentialError, StoreError};
pub use interceptor::AuthInterceptor;
pub use keychain::KeychainSessionStore;
pub use service::AuthService;
pub use session::Session;
pub use store::{ConfiguredStore, MemorySessionStore, SessionStore};
pub use vault::{ClearReason, SessionEvent, SessionStatus, SessionVault};
