//! Session configuration parsed from environment variables.
//!
//! The refresh/verify timing constants were tuned against a rate-limited
//! refresh endpoint; they are configuration, not protocol.

use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_LOGIN_ROUTE: &str = "/login";
pub const DEFAULT_WHOAMI_PATH: &str = "/api/auth/me";
pub const DEFAULT_LOGIN_PATH: &str = "/api/auth/login";
pub const DEFAULT_REFRESH_PATH: &str = "/api/auth/refresh";
pub const DEFAULT_LOGOUT_PATH: &str = "/api/auth/logout";
pub const DEFAULT_REFRESH_MIN_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_VERIFY_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_QUIET_PERIOD_MS: u64 = 3_000;
pub const DEFAULT_BOOTSTRAP_WAIT_MS: u64 = 5_000;
pub const DEFAULT_REFRESH_HINT_COOKIE: &str = "has_refresh_token";
pub const DEFAULT_HTTP_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_HTTP_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Paths of the auth endpoints the core talks to directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEndpoints {
    pub whoami: String,
    pub login: String,
    pub refresh: String,
    pub logout: String,
}

impl AuthEndpoints {
    /// Endpoints whose 401s are final and never trigger a refresh.
    #[must_use]
    pub fn is_exempt(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        path == self.refresh || path == self.login || path == self.whoami
    }
}

impl Default for AuthEndpoints {
    fn default() -> Self {
        Self {
            whoami: DEFAULT_WHOAMI_PATH.into(),
            login: DEFAULT_LOGIN_PATH.into(),
            refresh: DEFAULT_REFRESH_PATH.into(),
            logout: DEFAULT_LOGOUT_PATH.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_HTTP_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_HTTP_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub base_url: String,
    /// Client-side route the UI navigates to after session expiry.
    pub login_route: String,
    pub endpoints: AuthEndpoints,
    /// Minimum spacing between two network refreshes.
    pub refresh_min_interval: Duration,
    /// Period of the background verifier.
    pub verify_interval: Duration,
    /// Verifier stays idle this long after the most recent bootstrap.
    pub quiet_period: Duration,
    /// Upper bound on optimistic session recovery during mount.
    pub bootstrap_wait: Duration,
    /// Cookie whose presence hints that a refresh credential exists.
    pub refresh_hint_cookie: String,
    pub timeouts: HttpTimeouts,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            login_route: DEFAULT_LOGIN_ROUTE.into(),
            endpoints: AuthEndpoints::default(),
            refresh_min_interval: Duration::from_millis(DEFAULT_REFRESH_MIN_INTERVAL_MS),
            verify_interval: Duration::from_secs(DEFAULT_VERIFY_INTERVAL_SECS),
            quiet_period: Duration::from_millis(DEFAULT_QUIET_PERIOD_MS),
            bootstrap_wait: Duration::from_millis(DEFAULT_BOOTSTRAP_WAIT_MS),
            refresh_hint_cookie: DEFAULT_REFRESH_HINT_COOKIE.into(),
            timeouts: HttpTimeouts::default(),
        }
    }
}

impl SessionConfig {
    /// Build config from environment variables.
    ///
    /// Optional (defaults in parentheses):
    /// - `STOREFRONT_BASE_URL` (`http://127.0.0.1:8080`)
    /// - `STOREFRONT_LOGIN_ROUTE` (`/login`)
    /// - `AUTH_WHOAMI_PATH`, `AUTH_LOGIN_PATH`, `AUTH_REFRESH_PATH`, `AUTH_LOGOUT_PATH`
    /// - `SESSION_REFRESH_MIN_INTERVAL_MS` (5000)
    /// - `SESSION_VERIFY_INTERVAL_SECS` (60)
    /// - `SESSION_QUIET_PERIOD_MS` (3000)
    /// - `SESSION_BOOTSTRAP_WAIT_MS` (5000)
    /// - `SESSION_REFRESH_HINT_COOKIE` (`has_refresh_token`)
    /// - `HTTP_REQUEST_TIMEOUT_SECS` (30), `HTTP_CONNECT_TIMEOUT_SECS` (10)
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the verify interval is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`SessionConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());
        let number = |key: &str, default: u64| lookup(key).and_then(|v| v.trim().parse::<u64>().ok()).unwrap_or(default);

        let base_url = text("STOREFRONT_BASE_URL", DEFAULT_BASE_URL)
            .trim_end_matches('/')
            .to_owned();
        validate_base_url(&base_url)?;

        let verify_interval_secs = number("SESSION_VERIFY_INTERVAL_SECS", DEFAULT_VERIFY_INTERVAL_SECS);
        if verify_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration { var: "SESSION_VERIFY_INTERVAL_SECS" });
        }

        Ok(Self {
            base_url,
            login_route: text("STOREFRONT_LOGIN_ROUTE", DEFAULT_LOGIN_ROUTE),
            endpoints: AuthEndpoints {
                whoami: text("AUTH_WHOAMI_PATH", DEFAULT_WHOAMI_PATH),
                login: text("AUTH_LOGIN_PATH", DEFAULT_LOGIN_PATH),
                refresh: text("AUTH_REFRESH_PATH", DEFAULT_REFRESH_PATH),
                logout: text("AUTH_LOGOUT_PATH", DEFAULT_LOGOUT_PATH),
            },
            refresh_min_interval: Duration::from_millis(number(
                "SESSION_REFRESH_MIN_INTERVAL_MS",
                DEFAULT_REFRESH_MIN_INTERVAL_MS,
            )),
            verify_interval: Duration::from_secs(verify_interval_secs),
            quiet_period: Duration::from_millis(number("SESSION_QUIET_PERIOD_MS", DEFAULT_QUIET_PERIOD_MS)),
            bootstrap_wait: Duration::from_millis(number("SESSION_BOOTSTRAP_WAIT_MS", DEFAULT_BOOTSTRAP_WAIT_MS)),
            refresh_hint_cookie: text("SESSION_REFRESH_HINT_COOKIE", DEFAULT_REFRESH_HINT_COOKIE),
            timeouts: HttpTimeouts {
                request_secs: number("HTTP_REQUEST_TIMEOUT_SECS", DEFAULT_HTTP_REQUEST_TIMEOUT_SECS),
                connect_secs: number("HTTP_CONNECT_TIMEOUT_SECS", DEFAULT_HTTP_CONNECT_TIMEOUT_SECS),
            },
        })
    }
}

fn validate_base_url(raw: &str) -> Result<(), ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidBaseUrl { url: raw.to_owned(), reason };
    let url = reqwest::Url::parse(raw).map_err(|e| invalid(e.to_string()))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(invalid(format!("unsupported scheme `{other}`"))),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
