//! Error taxonomy for the session core.
//!
//! ERROR HANDLING
//! ==============
//! `ApiError` is what callers of the pipeline and the session store see.
//! `RefreshError` is the shared verdict of one refresh attempt and must be
//! `Clone` because every single-flight waiter receives its own copy.
//! 401 and 429 get dedicated variants: neither is ever a generic failure.

/// Network-level failure: the request never produced an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport failed: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

/// Errors surfaced to callers of the API client and the session store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Access credential rejected. `silent` marks failures that must not be
    /// shown to the user (anonymous browsing of public pages).
    #[error("unauthorized: {path}")]
    Unauthorized { path: String, silent: bool },

    #[error("rate limited: {path}")]
    RateLimited { path: String },

    /// Login or registration rejected; always shown inline.
    #[error("{0}")]
    Validation(String),

    #[error("unexpected response: status {status}")]
    Unexpected { status: u16, body: String },

    #[error("response decode failed: {0}")]
    Decode(String),
}

impl ApiError {
    /// Stable machine-readable code for UI and log correlation.
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "E_TRANSPORT",
            Self::Unauthorized { .. } => "E_UNAUTHORIZED",
            Self::RateLimited { .. } => "E_RATE_LIMITED",
            Self::Validation(_) => "E_VALIDATION",
            Self::Unexpected { .. } => "E_UNEXPECTED",
            Self::Decode(_) => "E_DECODE",
        }
    }

    #[must_use]
    pub fn is_silent(&self) -> bool {
        matches!(self, Self::Unauthorized { silent: true, .. })
    }
}

/// Verdict of a refresh attempt that did not produce fresh credentials.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RefreshError {
    #[error("refresh credential expired")]
    Expired,

    /// 429 from the refresh endpoint. Never mutates the session.
    #[error("refresh rate limited")]
    RateLimited,

    #[error("refresh endpoint unreachable: {0}")]
    Transport(String),

    #[error("refresh endpoint returned status {0}")]
    Server(u16),
}

impl RefreshError {
    /// Whether this verdict ends the session (subject to route rules).
    #[must_use]
    pub fn ends_session(&self) -> bool {
        !matches!(self, Self::RateLimited)
    }
}

/// Invalid runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("{var} must be greater than zero")]
    ZeroDuration { var: &'static str },

    #[error("http client build failed: {0}")]
    HttpClientBuild(String),
}

#[cfg(test)]
#[path = "error_test.rs"]
mod tests;
