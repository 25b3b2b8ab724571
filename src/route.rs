//! Route classification for the current client-side location.
//!
//! SYSTEM CONTEXT
//! ==============
//! Every other component asks this module one question: does a failure on
//! the current page deserve the user's attention? Protected pages alarm and
//! expire, auth pages refresh quietly, public pages swallow 401s entirely.

use std::sync::{Arc, PoisonError, RwLock};

/// Path prefixes that require an authenticated session. Matched per segment.
pub const PROTECTED_PREFIXES: &[&str] = &["/profile", "/checkout", "/orders", "/invoices", "/admin"];

/// Exact auth-page paths.
pub const AUTH_PAGES: &[&str] = &["/login", "/register"];

/// Auth-page prefixes matched as raw string prefixes (token-bearing links).
pub const AUTH_PAGE_PREFIXES: &[&str] = &["/forgot-password", "/reset-password"];

/// Classification of a client-side path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RouteClass {
    Public,
    AuthPage,
    Protected,
}

impl RouteClass {
    /// Whether authentication failures on this route may spend a refresh.
    #[must_use]
    pub fn wants_refresh(self) -> bool {
        !matches!(self, Self::Public)
    }
}

/// Classify a location path. Pure and total: anything unrecognized is public.
#[must_use]
pub fn classify(path: &str) -> RouteClass {
    let path = strip_query(path);

    if AUTH_PAGES.iter().any(|page| segment_match(path, page))
        || AUTH_PAGE_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
    {
        return RouteClass::AuthPage;
    }
    if PROTECTED_PREFIXES.iter().any(|prefix| segment_match(path, prefix)) {
        return RouteClass::Protected;
    }
    RouteClass::Public
}

fn strip_query(path: &str) -> &str {
    let end = path.find(['?', '#']).unwrap_or(path.len());
    &path[..end]
}

fn segment_match(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

// =============================================================================
// LOCATION
// =============================================================================

/// Source of the current client-side path.
pub trait Location: Send + Sync {
    fn current_path(&self) -> String;

    fn route_class(&self) -> RouteClass {
        classify(&self.current_path())
    }
}

/// Shared, navigable location handle. Clones observe the same path.
#[derive(Clone, Debug)]
pub struct SharedLocation {
    path: Arc<RwLock<String>>,
}

impl SharedLocation {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: Arc::new(RwLock::new(path.into())) }
    }

    /// Replace the current path.
    pub fn navigate(&self, path: impl Into<String>) {
        let mut current = self.path.write().unwrap_or_else(PoisonError::into_inner);
        *current = path.into();
    }
}

impl Default for SharedLocation {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Location for SharedLocation {
    fn current_path(&self) -> String {
        self.path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
#[path = "route_test.rs"]
mod tests;
