//! HTTP transport seam.
//!
//! ARCHITECTURE
//! ============
//! Everything that reaches the network goes through [`HttpTransport`]. The
//! production implementation is a thin `reqwest` wrapper with a shared cookie
//! jar (access and refresh credentials are cookies set by the backend); tests
//! script replies per path instead.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use reqwest::cookie::{CookieStore, Jar};
use serde::de::DeserializeOwned;

use crate::config::SessionConfig;
use crate::error::{ApiError, ConfigError, TransportError};

// =============================================================================
// REQUEST / RESPONSE
// =============================================================================

/// One logical outbound request.
///
/// `retried` and `silent` belong to the interceptor pipeline; callers can
/// read them but only the pipeline sets them.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    method: Method,
    path: String,
    body: Option<serde_json::Value>,
    pub(crate) retried: bool,
    pub(crate) silent: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), body: None, retried: false, silent: false }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn with_json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn body(&self) -> Option<&serde_json::Value> {
        self.body.as_ref()
    }

    #[must_use]
    pub fn retried(&self) -> bool {
        self.retried
    }

    #[must_use]
    pub fn silent(&self) -> bool {
        self.silent
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decode the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Decode`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[async_trait::async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request. Any HTTP status is `Ok`; only network failure is `Err`.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;

    /// Non-authoritative hint that a refresh credential is stored.
    fn has_refresh_hint(&self) -> bool {
        false
    }
}

/// `reqwest`-backed transport rooted at the configured base URL.
pub struct ReqwestTransport {
    http: reqwest::Client,
    base_url: reqwest::Url,
    cookies: Arc<Jar>,
    refresh_hint_cookie: String,
}

impl ReqwestTransport {
    /// Build a transport with a fresh cookie jar.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL is invalid or the HTTP client fails to build.
    pub fn new(config: &SessionConfig) -> Result<Self, ConfigError> {
        Self::with_jar(config, Arc::new(Jar::default()))
    }

    /// Build a transport around an existing cookie jar.
    ///
    /// # Errors
    ///
    /// Same as [`ReqwestTransport::new`].
    pub fn with_jar(config: &SessionConfig, cookies: Arc<Jar>) -> Result<Self, ConfigError> {
        let base_url = reqwest::Url::parse(&config.base_url).map_err(|e| ConfigError::InvalidBaseUrl {
            url: config.base_url.clone(),
            reason: e.to_string(),
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeouts.request_secs))
            .connect_timeout(Duration::from_secs(config.timeouts.connect_secs))
            .cookie_provider(Arc::clone(&cookies))
            .build()
            .map_err(|e| ConfigError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, base_url, cookies, refresh_hint_cookie: config.refresh_hint_cookie.clone() })
    }

    fn url_for(&self, path: &str) -> Result<reqwest::Url, TransportError> {
        self.base_url
            .join(path)
            .map_err(|e| TransportError(format!("invalid request path `{path}`: {e}")))
    }
}

#[async_trait::async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let url = self.url_for(request.path())?;
        let mut builder = self
            .http
            .request(request.method().clone(), url)
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = request.body() {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok(ApiResponse { status, body })
    }

    fn has_refresh_hint(&self) -> bool {
        self.cookies
            .cookies(&self.base_url)
            .and_then(|header| header.to_str().map(str::to_owned).ok())
            .is_some_and(|header| cookie_header_has(&header, &self.refresh_hint_cookie))
    }
}

/// Whether a `Cookie` header value carries a cookie named `name`.
fn cookie_header_has(header: &str, name: &str) -> bool {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(key, _)| key == name)
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
