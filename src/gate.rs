//! Refresh gate: single-flight, debounced access-credential refresh.
//!
//! DESIGN
//! ======
//! Every path that wants fresh credentials (reactive 401s, the periodic
//! verifier, optimistic recovery at mount) calls
//! [`RefreshGate::ensure_fresh_token`]; nothing else may call the refresh
//! endpoint. Admission is decided under one mutex, in this order:
//!
//! 1. a live [`RefreshAttempt`] exists: join its shared outcome;
//! 2. the last completion is younger than `min_interval`: answer from cache;
//! 3. otherwise start a new attempt.
//!
//! The attempt runs on its own task, so it completes even when every caller
//! stops waiting. It settles the gate state before waiters are woken.
//!
//! TRADE-OFFS
//! ==========
//! Within the debounce window callers get the previous verdict, possibly a
//! few seconds stale, rather than a second request to a rate-limited
//! endpoint. A 429 stamps the completion time (no hammering) but keeps the
//! previous verdict, so it never reads as success or expiry.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::error::RefreshError;
use crate::route::{Location, RouteClass};
use crate::session::SessionStore;
use crate::transport::{ApiRequest, HttpTransport};
use crate::types::ExpiryReason;

/// Proof that the access credential was refreshed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fresh;

pub type RefreshResult = Result<Fresh, RefreshError>;

type SharedRefresh = Shared<BoxFuture<'static, RefreshResult>>;

// =============================================================================
// REFRESH ATTEMPT
// =============================================================================

/// The single live refresh. Exists from start until the network call settles.
#[derive(Clone)]
pub struct RefreshAttempt {
    id: u64,
    started_at: Instant,
    outcome: SharedRefresh,
}

impl RefreshAttempt {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

impl fmt::Debug for RefreshAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshAttempt")
            .field("id", &self.id)
            .field("started_at", &self.started_at)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// GATE STATE
// =============================================================================

#[derive(Clone, Debug)]
struct LastRefresh {
    completed_at: Instant,
    /// Session epoch the verdict belongs to.
    epoch: u64,
    /// Last definitive verdict. Never `RateLimited`.
    verdict: Option<RefreshResult>,
}

pub(crate) enum Admission {
    Join(SharedRefresh),
    Cached(RefreshResult),
    Start,
}

#[derive(Default)]
pub(crate) struct GateState {
    next_id: u64,
    live: Option<RefreshAttempt>,
    last: Option<LastRefresh>,
}

impl GateState {
    pub(crate) fn admit(&self, now: Instant, epoch: u64, min_interval: Duration) -> Admission {
        if let Some(live) = &self.live {
            return Admission::Join(live.outcome.clone());
        }
        let Some(last) = &self.last else {
            return Admission::Start;
        };
        if last.epoch != epoch || now.saturating_duration_since(last.completed_at) >= min_interval {
            return Admission::Start;
        }
        Admission::Cached(last.verdict.clone().unwrap_or(Err(RefreshError::RateLimited)))
    }

    fn begin(&mut self, now: Instant, outcome_for: impl FnOnce(u64) -> SharedRefresh) -> SharedRefresh {
        self.next_id += 1;
        let id = self.next_id;
        let outcome = outcome_for(id);
        self.live = Some(RefreshAttempt { id, started_at: now, outcome: outcome.clone() });
        outcome
    }

    fn settle(&mut self, id: u64, now: Instant, epoch: u64, result: &RefreshResult) {
        if self.live.as_ref().is_some_and(|live| live.id == id) {
            self.live = None;
        }
        let verdict = if matches!(result, Err(RefreshError::RateLimited)) {
            self.last
                .take()
                .filter(|last| last.epoch == epoch)
                .and_then(|last| last.verdict)
        } else {
            Some(result.clone())
        };
        self.last = Some(LastRefresh { completed_at: now, epoch, verdict });
    }
}

// =============================================================================
// REFRESH GATE
// =============================================================================

#[derive(Clone)]
pub struct RefreshGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    transport: Arc<dyn HttpTransport>,
    refresh_path: String,
    session: SessionStore,
    location: Arc<dyn Location>,
    clock: Arc<dyn Clock>,
    min_interval: Duration,
    state: Mutex<GateState>,
}

impl RefreshGate {
    #[must_use]
    pub fn new(
        config: &SessionConfig,
        transport: Arc<dyn HttpTransport>,
        session: SessionStore,
        location: Arc<dyn Location>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                transport,
                refresh_path: config.endpoints.refresh.clone(),
                session,
                location,
                clock,
                min_interval: config.refresh_min_interval,
                state: Mutex::new(GateState::default()),
            }),
        }
    }

    /// Make sure the access credential is fresh, sharing work with every
    /// concurrent caller.
    ///
    /// # Errors
    ///
    /// Returns the [`RefreshError`] of the attempt (or cached verdict) that
    /// answered this call. Session expiry has already been applied.
    pub async fn ensure_fresh_token(&self) -> RefreshResult {
        let pending = {
            let mut state = self.inner.lock_state();
            let now = self.inner.clock.now();
            let epoch = self.inner.session.epoch();
            let admission = state.admit(now, epoch, self.inner.min_interval);
            match admission {
                Admission::Join(outcome) => {
                    debug!("refresh in flight; joining");
                    outcome
                }
                Admission::Cached(verdict) => {
                    drop(state);
                    debug!(fresh = verdict.is_ok(), "refresh debounced; using cached verdict");
                    if let Err(error) = &verdict {
                        self.inner.apply_cached(epoch, error);
                    }
                    return verdict;
                }
                Admission::Start => state.begin(now, |id| {
                    let inner = Arc::clone(&self.inner);
                    tokio::spawn(async move { inner.run_attempt(id, epoch).await })
                        .map(|joined| {
                            joined.unwrap_or_else(|e| Err(RefreshError::Transport(format!("refresh task failed: {e}"))))
                        })
                        .boxed()
                        .shared()
                }),
            }
        };
        pending.await
    }

    /// The live attempt, if a refresh is in flight.
    #[must_use]
    pub fn live_attempt(&self) -> Option<RefreshAttempt> {
        self.inner.lock_state().live.clone()
    }

    #[must_use]
    pub fn last_completed_at(&self) -> Option<Instant> {
        self.inner.lock_state().last.as_ref().map(|last| last.completed_at)
    }
}

impl GateInner {
    fn lock_state(&self) -> MutexGuard<'_, GateState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_attempt(self: Arc<Self>, id: u64, epoch: u64) -> RefreshResult {
        info!(attempt = id, "refreshing access credential");
        let request = ApiRequest::post(&self.refresh_path);
        let result = match self.transport.send(&request).await {
            Ok(response) => match response.status {
                200..=299 => Ok(Fresh),
                401 => Err(RefreshError::Expired),
                429 => Err(RefreshError::RateLimited),
                status => Err(RefreshError::Server(status)),
            },
            Err(e) => Err(RefreshError::Transport(e.0)),
        };

        self.lock_state().settle(id, self.clock.now(), epoch, &result);
        self.apply(epoch, &result);
        result
    }

    /// Carry a settled verdict into the session.
    fn apply(&self, epoch: u64, result: &RefreshResult) {
        let error = match result {
            Ok(Fresh) => {
                info!("access credential refreshed");
                return;
            }
            Err(error) => error,
        };
        let Some(reason) = expiry_reason(error) else {
            warn!("refresh rate limited; session left untouched");
            return;
        };
        match error {
            RefreshError::Transport(message) => warn!(error = %message, "refresh endpoint unreachable"),
            RefreshError::Server(status) => warn!(status, "refresh endpoint failed"),
            _ => info!("refresh credential expired"),
        }

        if self.session.epoch() != epoch {
            debug!("session changed during refresh; verdict not applied");
            return;
        }
        if self.location.route_class() == RouteClass::Protected {
            self.session.expire(reason);
        } else {
            self.session.clear_silently();
        }
    }

    /// A debounced failure seen from a protected route still ends the
    /// session there, even if the original attempt settled elsewhere.
    fn apply_cached(&self, epoch: u64, error: &RefreshError) {
        let Some(reason) = expiry_reason(error) else {
            return;
        };
        if self.session.epoch() == epoch && self.location.route_class() == RouteClass::Protected {
            self.session.expire(reason);
        }
    }
}

fn expiry_reason(error: &RefreshError) -> Option<ExpiryReason> {
    if !error.ends_session() {
        return None;
    }
    Some(match error {
        RefreshError::Transport(_) => ExpiryReason::RefreshUnreachable,
        RefreshError::Server(status) => ExpiryReason::RefreshFailed { status: *status },
        _ => ExpiryReason::RefreshRejected,
    })
}

#[cfg(test)]
#[path = "gate_test.rs"]
mod tests;
