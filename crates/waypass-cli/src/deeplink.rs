//! Deep-link resolution for the command line.
//!
//! Accepts `scheme://host/<path>` links as well as bare paths and maps the
//! path segments onto a `Route`.

use waypass_core::navigation::{Route, RouteResolver};

pub struct DeepLinkResolver;

impl DeepLinkResolver {
    /// Strip `scheme://host` and any query or fragment, leaving the path.
    fn path_of(url: &str) -> &str {
        let without_scheme = match url.split_once("://") {
            Some((_, rest)) => rest.find('/').map_or("", |i| &rest[i..]),
            None => url,
        };
        without_scheme
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
    }
}

impl RouteResolver for DeepLinkResolver {
    fn resolve(&self, url: &str) -> Route {
        let path = Self::path_of(url);
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] | ["home"] => Route::Home,
            ["login"] => Route::Login,
            ["signup"] => Route::Signup,
            ["forgot-password"] => Route::ForgotPassword,
            ["profile", id] => Route::profile(*id),
            ["settings"] => Route::Settings { section: None },
            ["settings", section] => Route::Settings {
                section: Some(section.to_string()),
            },
            ["identity"] => Route::IdentitySetup { step: None },
            ["identity", step] => Route::IdentitySetup {
                step: Some(step.to_string()),
            },
            _ => Route::NotFound {
                path: path.to_string(),
            },
        }
    }
}
