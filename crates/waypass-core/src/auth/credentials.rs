use std::fmt;

use serde::Serialize;

use super::CredentialError;

/// Minimum username length accepted by the login form
pub const MIN_USERNAME_LENGTH: usize = 3;

/// Minimum password length accepted by the login form
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Username and password as sent to the login endpoint.
#[derive(Clone, Serialize)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into().trim().to_string(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Check the form before anything goes over the wire.
    pub fn validate(&self) -> Result<(), CredentialError> {
        if self.username.is_empty() {
            return Err(CredentialError::MissingUsername);
        }
        if self.password.is_empty() {
            return Err(CredentialError::MissingPassword);
        }
        if self.username.chars().count() < MIN_USERNAME_LENGTH {
            return Err(CredentialError::UsernameTooShort {
                min: MIN_USERNAME_LENGTH,
            });
        }
        if self.password.chars().count() < MIN_PASSWORD_LENGTH {
            return Err(CredentialError::PasswordTooShort {
                min: MIN_PASSWORD_LENGTH,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
