// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Route access gating.
//!
//! [`AccessGate::can_enter`] is the guard consulted before showing any
//! protected area. A denied check raises the lock screen as a side effect; a
//! granted one changes nothing.

use std::sync::Arc;

use serde::Serialize;

use crate::engine::LockService;

/// Path that matches anything not otherwise routed.
pub const WILDCARD: &str = "**";

/// What a route resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    /// A page, identified by name
    Page(String),
    /// Send the visitor to another path
    Redirect(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    pub path: String,
    pub target: RouteTarget,
    /// Protected routes require an unlocked session
    pub protected: bool,
}

impl Route {
    pub fn page(path: &str, name: &str) -> Self {
        Self {
            path: path.to_string(),
            target: RouteTarget::Page(name.to_string()),
            protected: true,
        }
    }

    pub fn redirect(path: &str, to: &str) -> Self {
        Self {
            path: path.to_string(),
            target: RouteTarget::Redirect(to.to_string()),
            protected: true,
        }
    }

    pub fn public(mut self) -> Self {
        self.protected = false;
        self
    }
}

/// Ordered route list. The first matching route wins; [`WILDCARD`] matches
/// every path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    routes: Vec<Route>,
}

/// Redirect chains longer than this are treated as loops.
const MAX_REDIRECTS: usize = 8;

impl RouteTable {
    pub fn new(routes: Vec<Route>) -> Self {
        Self { routes }
    }

    /// Home at `""`, `about`, and everything else redirected home. All
    /// protected.
    pub fn default_routes() -> Self {
        Self::new(vec![
            Route::page("", "home"),
            Route::page("about", "about"),
            Route::redirect(WILDCARD, ""),
        ])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Follow redirects from `path` to a page route.
    ///
    /// Returns `None` if nothing matches or the redirects loop.
    pub fn resolve(&self, path: &str) -> Option<&Route> {
        let mut current = normalize_path(path);
        for _ in 0..=MAX_REDIRECTS {
            let route = self
                .routes
                .iter()
                .find(|r| r.path == current || r.path == WILDCARD)?;
            match &route.target {
                RouteTarget::Page(_) => return Some(route),
                RouteTarget::Redirect(to) => current = normalize_path(to),
            }
        }
        tracing::warn!("Redirect loop while resolving {:?}", path);
        None
    }
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::default_routes()
    }
}

/// Strip leading and trailing slashes: `/about/` becomes `about`, `/` becomes `""`.
pub fn normalize_path(path: &str) -> String {
    path.trim().trim_matches('/').to_string()
}

/// Result of [`AccessGate::navigate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Granted(Route),
    Denied { requested: String },
}

impl Navigation {
    pub fn is_granted(&self) -> bool {
        matches!(self, Navigation::Granted(_))
    }
}

#[derive(Debug, Clone)]
pub struct AccessGate {
    service: Arc<LockService>,
    routes: RouteTable,
}

impl AccessGate {
    pub fn new(service: Arc<LockService>) -> Self {
        Self::with_routes(service, RouteTable::default_routes())
    }

    pub fn with_routes(service: Arc<LockService>, routes: RouteTable) -> Self {
        Self { service, routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// True if the session is valid. Otherwise raises the lock screen and
    /// returns false.
    pub fn can_enter(&self) -> bool {
        if self.service.check_authentication() {
            return true;
        }
        self.service.show_lock();
        tracing::debug!(event = "GATE_DENIED", "Access gate denied entry; lock screen shown");
        false
    }

    /// Resolve `path` and apply the gate to protected routes.
    pub fn navigate(&self, path: &str) -> Navigation {
        let requested = normalize_path(path);
        let Some(route) = self.routes.resolve(&requested) else {
            return Navigation::Denied { requested };
        };
        if !route.protected || self.can_enter() {
            Navigation::Granted(route.clone())
        } else {
            Navigation::Denied { requested }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LockConfig, DEFAULT_PASSWORD_HASH};
    use crate::store::MemoryStore;
    use std::time::Duration;

    fn gate() -> (Arc<LockService>, AccessGate) {
        let service = Arc::new(LockService::new(
            LockConfig::new(DEFAULT_PASSWORD_HASH, Duration::ZERO, "angular_lock_auth"),
            Arc::new(MemoryStore::new()),
        ));
        let gate = AccessGate::new(service.clone());
        (service, gate)
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/about/"), "about");
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path(" //about "), "about");
    }

    #[test]
    fn test_default_routes_resolve() {
        let table = RouteTable::default_routes();
        assert_eq!(table.resolve("/").unwrap().target, RouteTarget::Page("home".into()));
        assert_eq!(table.resolve("about").unwrap().target, RouteTarget::Page("about".into()));
        assert_eq!(table.resolve("/no/such/page").unwrap().path, "");
    }

    #[test]
    fn test_redirect_loop_resolves_to_none() {
        let table = RouteTable::new(vec![Route::redirect("a", "b"), Route::redirect("b", "a")]);
        assert!(table.resolve("a").is_none());
    }

    #[test]
    fn test_denied_gate_shows_lock() {
        let (service, gate) = gate();
        assert!(!service.is_lock_visible());
        assert!(!gate.can_enter());
        assert!(service.is_lock_visible());
    }

    #[test]
    fn test_granted_gate_leaves_lock_flag_alone() {
        let (service, gate) = gate();
        assert!(service.validate_password("password123"));
        assert!(!service.is_lock_visible());
        assert!(gate.can_enter());
        assert!(!service.is_lock_visible());
    }

    #[test]
    fn test_navigate_protected_and_public() {
        let (service, _) = gate();
        let routes = RouteTable::new(vec![
            Route::page("login-help", "help").public(),
            Route::page("about", "about"),
        ]);
        let gate = AccessGate::with_routes(service.clone(), routes);

        assert!(gate.navigate("/login-help").is_granted());
        assert!(!service.is_lock_visible());

        assert_eq!(
            gate.navigate("/about/"),
            Navigation::Denied {
                requested: "about".into()
            }
        );
        assert!(service.is_lock_visible());

        assert!(service.validate_password("password123"));
        assert!(gate.navigate("about").is_granted());

        // Unrouted paths are denied without a wildcard
        assert!(!gate.navigate("missing").is_granted());
    }

    #[test]
    fn test_wildcard_redirects_home_after_unlock() {
        let (service, gate) = gate();
        assert!(service.validate_password("password123"));
        match gate.navigate("/anything") {
            Navigation::Granted(route) => assert_eq!(route.target, RouteTarget::Page("home".into())),
            other => panic!("expected grant, got {:?}", other),
        }
    }
}
