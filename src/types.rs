//! Session data model and auth payload shapes.
//!
//! DESIGN
//! ======
//! `Session` is an enum rather than a status flag plus an optional identity,
//! so "identity present iff authenticated" holds by construction.
//!
//! COMPATIBILITY
//! =============
//! The login endpoint answers HTTP 200 for both success and failure and only
//! the payload shape tells them apart. [`parse_login_reply`] preserves that
//! contract. It is a backend defect being wrapped, not a design to copy.

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ApiError;

// =============================================================================
// IDENTITY
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Customer,
    Admin,
    #[serde(other)]
    Other,
}

/// The authenticated user as reported by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Backend user id. Accepted as a JSON string or number.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: Role,
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) if !s.is_empty() => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!("expected non-empty string or number id, got {other}"))),
    }
}

/// Login form payload. `Debug` never prints the password.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl Credentials {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self { email: email.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

// =============================================================================
// SESSION
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionStatus {
    Unknown,
    Authenticated,
    Anonymous,
}

/// Current identity of this client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Session {
    /// Only before the first bootstrap resolves.
    #[default]
    Unknown,
    Anonymous,
    Authenticated(Identity),
}

impl Session {
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Unknown => SessionStatus::Unknown,
            Self::Anonymous => SessionStatus::Anonymous,
            Self::Authenticated(_) => SessionStatus::Authenticated,
        }
    }

    #[must_use]
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Self::Authenticated(identity) => Some(identity),
            Self::Unknown | Self::Anonymous => None,
        }
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }
}

/// What UI consumers observe: the session plus whether mount is still resolving.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthState {
    pub session: Session,
    pub loading: bool,
}

impl AuthState {
    /// State at process start, before any bootstrap.
    #[must_use]
    pub fn initial() -> Self {
        Self { session: Session::Unknown, loading: true }
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::initial()
    }
}

// =============================================================================
// EVENTS
// =============================================================================

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ExpiryReason {
    /// Refresh endpoint answered 401.
    RefreshRejected,
    /// Refresh endpoint could not be reached.
    RefreshUnreachable,
    /// Refresh endpoint answered an unexpected status.
    RefreshFailed { status: u16 },
}

impl fmt::Display for ExpiryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefreshRejected => f.write_str("refresh credential rejected"),
            Self::RefreshUnreachable => f.write_str("refresh endpoint unreachable"),
            Self::RefreshFailed { status } => write!(f, "refresh failed with status {status}"),
        }
    }
}

/// One-shot notifications for the UI layer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn(Identity),
    LoggedOut,
    /// Shown once per expiry; the UI should navigate to `redirect_to`.
    Expired { reason: ExpiryReason, redirect_to: String },
}

// =============================================================================
// PAYLOADS
// =============================================================================

#[derive(Deserialize)]
struct WhoAmIReply {
    #[serde(default, alias = "user")]
    identity: Option<Identity>,
}

/// Parse a whoami body: `{ "identity": {...} }` or `{ "identity": null }`.
///
/// # Errors
///
/// Returns [`ApiError::Decode`] if the body is not a whoami payload.
pub fn parse_whoami(body: &str) -> Result<Option<Identity>, ApiError> {
    let reply: WhoAmIReply = serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    Ok(reply.identity)
}

const GENERIC_LOGIN_FAILURE: &str = "Login failed";

/// Interpret a login response by payload shape, not by status alone.
///
/// - 429 is rate limiting.
/// - 2xx with a non-null `id` is success.
/// - 2xx without `id`, or any 4xx, is a validation failure carrying the
///   backend `message` when one is present.
/// - Anything else is unexpected.
///
/// # Errors
///
/// Returns the [`ApiError`] describing the failed login.
pub fn parse_login_reply(path: &str, status: u16, body: &str) -> Result<Identity, ApiError> {
    if status == 429 {
        return Err(ApiError::RateLimited { path: path.to_owned() });
    }
    let value: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let message = value
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(serde_json::Value::as_str)
        .map(str::to_owned);

    match status {
        200..=299 => {
            let Some(value) = value else {
                return Err(ApiError::Decode(format!("login response is not JSON: {body}")));
            };
            let has_id = value.get("id").is_some_and(|id| !id.is_null());
            if !has_id {
                return Err(ApiError::Validation(message.unwrap_or_else(|| GENERIC_LOGIN_FAILURE.to_owned())));
            }
            serde_json::from_value(value).map_err(|e| ApiError::Decode(e.to_string()))
        }
        400..=499 => Err(ApiError::Validation(message.unwrap_or_else(|| GENERIC_LOGIN_FAILURE.to_owned()))),
        _ => Err(ApiError::Unexpected { status, body: body.to_owned() }),
    }
}

#[cfg(test)]
#[path = "types_test.rs"]
mod tests;
