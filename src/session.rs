//! Session store: the authoritative record of who this client is.
//!
//! DESIGN
//! ======
//! One `SessionStore` per client, cloned into every collaborator. State is
//! published through a `watch` channel so UI code can react to transitions,
//! and one-shot notices (login, logout, expiry) go out on a `broadcast`
//! channel. Every mutation is a single synchronous `send_if_modified`, so no
//! observer sees a half-applied transition.
//!
//! EPOCHS
//! ======
//! `login` and `logout` bump an epoch. Work that started under an older epoch
//! (a bootstrap, a refresh) must not overwrite the session when it settles.
//!
//! ERROR HANDLING
//! ==============
//! Bootstrap fails open: any transport or payload problem resolves to
//! `Anonymous` instead of leaving the client stuck in `Unknown`. Logout is
//! best-effort. Login failures are always returned to the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::{AuthEndpoints, SessionConfig};
use crate::error::ApiError;
use crate::transport::{ApiRequest, HttpTransport};
use crate::types::{
    AuthState, Credentials, ExpiryReason, Identity, Session, SessionEvent, SessionStatus, parse_login_reply,
    parse_whoami,
};

const EVENT_CAPACITY: usize = 16;

type SharedBootstrap = Shared<BoxFuture<'static, Session>>;

#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    transport: Arc<dyn HttpTransport>,
    endpoints: AuthEndpoints,
    login_route: String,
    clock: Arc<dyn Clock>,
    state: watch::Sender<AuthState>,
    events: broadcast::Sender<SessionEvent>,
    epoch: AtomicU64,
    /// Set by `expire`; cleared once the login surface is reached.
    redirect_pending: AtomicBool,
    bootstrap: Mutex<BootstrapSlot>,
}

#[derive(Default)]
struct BootstrapSlot {
    next_id: u64,
    live: Option<(u64, SharedBootstrap)>,
    last_completed_at: Option<Instant>,
}

impl SessionStore {
    #[must_use]
    pub fn new(config: &SessionConfig, transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        let (state, _) = watch::channel(AuthState::initial());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(StoreInner {
                transport,
                endpoints: config.endpoints.clone(),
                login_route: config.login_route.clone(),
                clock,
                state,
                events,
                epoch: AtomicU64::new(0),
                redirect_pending: AtomicBool::new(false),
                bootstrap: Mutex::new(BootstrapSlot::default()),
            }),
        }
    }

    // =========================================================================
    // READS
    // =========================================================================

    #[must_use]
    pub fn snapshot(&self) -> AuthState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.inner.state.borrow().session.clone()
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.inner.state.borrow().session.status()
    }

    /// Watch every state transition.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state.subscribe()
    }

    /// Receive one-shot session notices.
    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    #[must_use]
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// When the most recent bootstrap settled, per the store's clock.
    #[must_use]
    pub fn last_bootstrap_at(&self) -> Option<Instant> {
        self.inner.lock_bootstrap().last_completed_at
    }

    #[must_use]
    pub fn redirect_pending(&self) -> bool {
        self.inner.redirect_pending.load(Ordering::SeqCst)
    }

    // =========================================================================
    // OPERATIONS
    // =========================================================================

    /// Submit credentials. Success is decided by payload shape, see
    /// [`parse_login_reply`].
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for rejected credentials (including
    /// HTTP 200 with a `message` body), or the transport/rate-limit error.
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity, ApiError> {
        let body = serde_json::to_value(credentials).map_err(|e| ApiError::Decode(e.to_string()))?;
        let request = ApiRequest::post(&self.inner.endpoints.login).with_json(body);
        let response = self.inner.transport.send(&request).await.map_err(|e| {
            warn!(error = %e, "login request failed");
            ApiError::from(e)
        })?;

        match parse_login_reply(request.path(), response.status, &response.body) {
            Ok(identity) => {
                self.inner.epoch.fetch_add(1, Ordering::SeqCst);
                self.inner.publish(Session::Authenticated(identity.clone()));
                info!(user_id = %identity.id, "login succeeded");
                let _ = self.inner.events.send(SessionEvent::LoggedIn(identity.clone()));
                Ok(identity)
            }
            Err(err) => {
                info!(code = err.error_code(), status = response.status, "login rejected");
                Err(err)
            }
        }
    }

    /// Notify the server, then clear the session whatever it answered.
    pub async fn logout(&self) {
        let request = ApiRequest::post(&self.inner.endpoints.logout);
        match self.inner.transport.send(&request).await {
            Ok(response) if response.is_success() => debug!("logout acknowledged"),
            Ok(response) => warn!(status = response.status, "logout not acknowledged; clearing session anyway"),
            Err(e) => warn!(error = %e, "logout request failed; clearing session anyway"),
        }

        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(Session::Anonymous);
        info!("logged out");
        let _ = self.inner.events.send(SessionEvent::LoggedOut);
    }

    /// Resolve the session from the whoami endpoint.
    ///
    /// Concurrent calls share one network request and observe the same
    /// result. Never fails: unreachable or malformed answers mean anonymous.
    pub async fn bootstrap(&self) -> Session {
        let pending = {
            let mut slot = self.inner.lock_bootstrap();
            if let Some((_, live)) = &slot.live {
                debug!("bootstrap already in flight; joining");
                live.clone()
            } else {
                slot.next_id += 1;
                let id = slot.next_id;
                let inner = Arc::clone(&self.inner);
                let shared = tokio::spawn(async move { inner.run_bootstrap(id).await })
                    .map(|joined| joined.unwrap_or(Session::Anonymous))
                    .boxed()
                    .shared();
                slot.live = Some((id, shared.clone()));
                shared
            }
        };
        pending.await
    }

    /// Force the session to anonymous and emit a single expiry notice.
    ///
    /// Returns `false` without side effects while a previous expiry's
    /// redirect is still pending.
    pub fn expire(&self, reason: ExpiryReason) -> bool {
        if self.inner.redirect_pending.swap(true, Ordering::SeqCst) {
            debug!(%reason, "expiry already pending; ignoring");
            return false;
        }
        self.inner.publish(Session::Anonymous);
        info!(%reason, "session expired");
        let _ = self.inner.events.send(SessionEvent::Expired {
            reason,
            redirect_to: self.inner.login_route.clone(),
        });
        true
    }

    /// Drop to anonymous without any user-visible notice.
    pub fn clear_silently(&self) {
        if self.inner.publish(Session::Anonymous) {
            debug!("session cleared silently");
        }
    }

    /// The UI reached the login surface after an expiry.
    pub fn redirect_settled(&self) {
        self.inner.redirect_pending.store(false, Ordering::SeqCst);
    }

    pub(crate) fn set_loading(&self, loading: bool) {
        self.inner.state.send_if_modified(|state| {
            let changed = state.loading != loading;
            state.loading = loading;
            changed
        });
    }
}

impl StoreInner {
    fn lock_bootstrap(&self) -> MutexGuard<'_, BootstrapSlot> {
        self.bootstrap.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the session. Returns whether anything changed.
    fn publish(&self, session: Session) -> bool {
        if session.is_authenticated() {
            self.redirect_pending.store(false, Ordering::SeqCst);
        }
        self.state.send_if_modified(|state| {
            if state.session == session {
                return false;
            }
            state.session = session;
            true
        })
    }

    async fn run_bootstrap(self: Arc<Self>, id: u64) -> Session {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let fetched = self.fetch_identity().await;

        let mut slot = self.lock_bootstrap();
        if slot.live.as_ref().is_some_and(|(live_id, _)| *live_id == id) {
            slot.live = None;
        }
        slot.last_completed_at = Some(self.clock.now());

        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!("session changed during bootstrap; keeping current session");
            return self.state.borrow().session.clone();
        }
        let session = match fetched {
            Some(identity) => Session::Authenticated(identity),
            None => Session::Anonymous,
        };
        info!(status = ?session.status(), "bootstrap resolved");
        self.publish(session.clone());
        session
    }

    async fn fetch_identity(&self) -> Option<Identity> {
        let request = ApiRequest::get(&self.endpoints.whoami);
        match self.transport.send(&request).await {
            Ok(response) if response.status == 200 => match parse_whoami(&response.body) {
                Ok(identity) => identity,
                Err(e) => {
                    warn!(error = %e, "whoami payload unreadable; treating as anonymous");
                    None
                }
            },
            Ok(response) => {
                warn!(status = response.status, "whoami broke its always-200 contract; treating as anonymous");
                None
            }
            Err(e) => {
                warn!(error = %e, "whoami unreachable; treating as anonymous");
                None
            }
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
