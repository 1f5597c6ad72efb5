//! Route authorization and navigation dispatch.
//!
//! This module provides:
//! - `Route`: the closed set of navigation destinations
//! - `AccessGuard`: decides whether a route is reachable with the current session
//! - `Router`: dispatches allowed routes, redirects denied ones to login and
//!   resumes the original destination afterwards via `PendingRouteSlot`

pub mod guard;
pub mod route;
pub mod router;

pub use guard::AccessGuard;
pub use route::{AccessDecision, DenialReason, Route};
pub use router::{PendingRouteSlot, Presenter, RouteResolver, Router};
