use std::fmt;

use serde::{Deserialize, Serialize};

/// A navigation destination. Immutable, compared structurally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "route", rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum Route {
    Login,
    Signup,
    ForgotPassword,
    Home,
    #[serde(rename_all = "camelCase")]
    Profile { user_id: String },
    Settings { section: Option<String> },
    IdentitySetup { step: Option<String> },
    NotFound { path: String },
    Unauthorized { requested: Box<Route> },
}

impl Route {
    /// Whether reaching this route needs a valid session.
    pub fn requires_auth(&self) -> bool {
        match self {
            Route::Login
            | Route::Signup
            | Route::ForgotPassword
            | Route::NotFound { .. }
            | Route::Unauthorized { .. } => false,
            Route::Home
            | Route::Profile { .. }
            | Route::Settings { .. }
            | Route::IdentitySetup { .. } => true,
        }
    }

    /// Stable tag, used as the presentation key.
    pub fn name(&self) -> &'static str {
        match self {
            Route::Login => "login",
            Route::Signup => "signup",
            Route::ForgotPassword => "forgotPassword",
            Route::Home => "home",
            Route::Profile { .. } => "profile",
            Route::Settings { .. } => "settings",
            Route::IdentitySetup { .. } => "identitySetup",
            Route::NotFound { .. } => "notFound",
            Route::Unauthorized { .. } => "unauthorized",
        }
    }

    /// Canonical path for this route, e.g. `/profile/user123`.
    pub fn path(&self) -> String {
        match self {
            Route::Login => "/login".to_string(),
            Route::Signup => "/signup".to_string(),
            Route::ForgotPassword => "/forgot-password".to_string(),
            Route::Home => "/home".to_string(),
            Route::Profile { user_id } => format!("/profile/{}", user_id),
            Route::Settings { section: None } => "/settings".to_string(),
            Route::Settings { section: Some(s) } => format!("/settings/{}", s),
            Route::IdentitySetup { step: None } => "/identity".to_string(),
            Route::IdentitySetup { step: Some(s) } => format!("/identity/{}", s),
            Route::NotFound { path } => path.clone(),
            Route::Unauthorized { .. } => "/unauthorized".to_string(),
        }
    }

    pub fn profile(user_id: impl Into<String>) -> Self {
        Route::Profile {
            user_id: user_id.into(),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum DenialReason {
    Unauthenticated,
    /// Reserved: account lock state is not tracked yet.
    Locked,
    /// Reserved: no permission model yet.
    InsufficientPermissions,
    /// Reserved: incomplete-profile redirects are not implemented yet.
    ///
    /// Nothing produces this today and the router sends it home. Once
    /// profile completeness is tracked it should lead to
    /// `Route::IdentitySetup` instead.
    RequiresAdditionalInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "reason", rename_all = "camelCase")]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub enum AccessDecision {
    Allowed,
    Denied(DenialReason),
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AccessDecision::Allowed)
    }
}
