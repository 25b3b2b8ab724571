//! Request pipeline: the 401/429 interceptor in front of every API call.
//!
//! DESIGN
//! ======
//! Each response is classified by the pure [`next_step`] function, then the
//! send loop acts on the step. The only loop edge is
//! `RefreshThenRetry -> resend`, and it flips `retried` first, so a logical
//! request is sent at most twice and spends at most one refresh.
//!
//! ERROR HANDLING
//! ==============
//! - 429 is returned as [`ApiError::RateLimited`] and never touches the
//!   session.
//! - 401 on a public route is marked silent and rejected without a refresh.
//! - 401 after a failed refresh is rejected with the original error; the
//!   gate has already applied any session expiry.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::{AuthEndpoints, SessionConfig};
use crate::error::ApiError;
use crate::gate::{Fresh, RefreshGate};
use crate::route::{Location, RouteClass};
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};

/// What the pipeline does with one response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Step {
    Deliver,
    RateLimited,
    /// 401 that must not be intercepted again.
    Reject,
    /// 401 during anonymous browsing: reject quietly, no refresh.
    Silence,
    RefreshThenRetry,
    Fail,
}

pub(crate) fn next_step(request: &ApiRequest, status: u16, route: RouteClass, endpoints: &AuthEndpoints) -> Step {
    match status {
        200..=299 => Step::Deliver,
        429 => Step::RateLimited,
        401 if request.retried() || endpoints.is_exempt(request.path()) => Step::Reject,
        401 if route.wants_refresh() => Step::RefreshThenRetry,
        401 => Step::Silence,
        _ => Step::Fail,
    }
}

/// API client for everything that is not an auth endpoint.
#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    gate: RefreshGate,
    location: Arc<dyn Location>,
    endpoints: AuthEndpoints,
}

impl ApiClient {
    #[must_use]
    pub fn new(
        config: &SessionConfig,
        transport: Arc<dyn HttpTransport>,
        gate: RefreshGate,
        location: Arc<dyn Location>,
    ) -> Self {
        Self { transport, gate, location, endpoints: config.endpoints.clone() }
    }

    /// Send a request through the interceptor.
    ///
    /// # Errors
    ///
    /// - [`ApiError::Transport`] if the network call failed
    /// - [`ApiError::Unauthorized`] for a 401 that could not be recovered
    /// - [`ApiError::RateLimited`] for a 429
    /// - [`ApiError::Unexpected`] for any other non-2xx status
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        loop {
            let response = self.transport.send(&request).await.map_err(|e| {
                warn!(path = request.path(), error = %e, "request failed");
                ApiError::from(e)
            })?;

            let route = self.location.route_class();
            match next_step(&request, response.status, route, &self.endpoints) {
                Step::Deliver => return Ok(response),
                Step::RateLimited => {
                    warn!(path = request.path(), "rate limited");
                    return Err(ApiError::RateLimited { path: request.path().to_owned() });
                }
                Step::Silence => {
                    request.silent = true;
                    debug!(path = request.path(), "unauthorized on public route; not refreshing");
                    return Err(unauthorized(&request));
                }
                Step::Reject => {
                    if request.silent() {
                        debug!(path = request.path(), retried = request.retried(), "unauthorized");
                    } else {
                        warn!(path = request.path(), retried = request.retried(), "unauthorized");
                    }
                    return Err(unauthorized(&request));
                }
                Step::RefreshThenRetry => match self.gate.ensure_fresh_token().await {
                    Ok(Fresh) => {
                        request.retried = true;
                        debug!(path = request.path(), "credential refreshed; retrying");
                    }
                    Err(e) => {
                        info!(path = request.path(), error = %e, "refresh failed; rejecting request");
                        return Err(unauthorized(&request));
                    }
                },
                Step::Fail => {
                    warn!(path = request.path(), status = response.status, "unexpected status");
                    return Err(ApiError::Unexpected { status: response.status, body: response.body });
                }
            }
        }
    }

    /// `GET` and decode a JSON body.
    ///
    /// # Errors
    ///
    /// Any [`send`](Self::send) error, or [`ApiError::Decode`].
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    /// `POST` a JSON body and decode the JSON reply.
    ///
    /// # Errors
    ///
    /// Any [`send`](Self::send) error, or [`ApiError::Decode`].
    pub async fn post_json<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T, ApiError> {
        self.send(ApiRequest::post(path).with_json(body)).await?.json()
    }
}

fn unauthorized(request: &ApiRequest) -> ApiError {
    ApiError::Unauthorized { path: request.path().to_owned(), silent: request.silent() }
}

#[cfg(test)]
#[path = "pipeline_test.rs"]
mod tests;
