//! Client-side session and credential lifecycle for the storefront.
//!
//! ARCHITECTURE
//! ============
//! ```text
//!   UI ──> SessionContext ──> ApiClient ──(401)──> RefreshGate ──> /refresh
//!              │                 │                     │
//!              │                 └──> HttpTransport <──┘
//!              ├──> SessionStore ──> /whoami, /login, /logout
//!              └──> SessionVerifier (mount + periodic) ──> RefreshGate
//! ```
//!
//! The gate is the only caller of the refresh endpoint. The store is the only
//! writer of session state. Route classification decides whether an auth
//! failure is spent on a refresh, silenced, or escalated to expiry.

pub mod clock;
pub mod config;
pub mod context;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod route;
pub mod session;
pub mod transport;
pub mod types;
pub mod verifier;

#[cfg(test)]
mod test_helpers;

pub use config::SessionConfig;
pub use context::SessionContext;
pub use error::{ApiError, ConfigError, RefreshError, TransportError};
pub use gate::{Fresh, RefreshGate, RefreshResult};
pub use pipeline::ApiClient;
pub use route::{Location, RouteClass, SharedLocation, classify};
pub use session::SessionStore;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, ReqwestTransport};
pub use types::{AuthState, Credentials, ExpiryReason, Identity, Role, Session, SessionEvent, SessionStatus};
