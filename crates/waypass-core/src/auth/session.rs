use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::api::{ApiError, TokenResponse};

/// Token type the auth service is expected to issue.
const BEARER_TOKEN_TYPE: &str = "Bearer";

/// One authenticated principal's credential set.
///
/// Tokens are only ever replaced wholesale: a refresh produces a new
/// `Session`, the old refresh token is not reused.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    user_id: String,
    access_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl Session {
    pub fn new(
        user_id: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            expires_at,
        }
    }

    /// Build a session from a login or refresh response received at `now`.
    pub fn from_token_response(response: TokenResponse, now: DateTime<Utc>) -> Result<Self, ApiError> {
        if !response.token_type.eq_ignore_ascii_case(BEARER_TOKEN_TYPE) {
            return Err(ApiError::InvalidResponse(format!(
                "unsupported token type: {}",
                response.token_type
            )));
        }
        if response.access_token.is_empty() {
            return Err(ApiError::InvalidResponse("empty access token".to_string()));
        }
        if response.expires_in < 0 {
            return Err(ApiError::InvalidResponse(format!(
                "negative expiresIn: {}",
                response.expires_in
            )));
        }

        let expires_at = Duration::try_seconds(response.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or_else(|| {
                ApiError::InvalidResponse(format!(
                    "expiresIn out of range: {}",
                    response.expires_in
                ))
            })?;

        Ok(Self {
            user_id: response.user_id,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at,
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// The refresh token, if the server issued a usable one.
    pub fn refresh_token(&self) -> Option<&str> {
        Some(self.refresh_token.as_str()).filter(|t| !t.is_empty())
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Check if the session is still usable right now.
    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }

    /// Valid only while `expires_at` is strictly after `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        (self.expires_at - Utc::now()).num_minutes().max(0)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}
