//! Session bootstrap at mount and the periodic background verifier.
//!
//! SYSTEM CONTEXT
//! ==============
//! `mount` runs once when the client starts: resolve the session, and when
//! the server says anonymous but a refresh credential is hinted, try one
//! bounded recovery through the gate. `spawn` then keeps an authenticated
//! session warm by calling the gate on a fixed period, idling on public
//! routes and right after a bootstrap.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::SessionConfig;
use crate::gate::{Fresh, RefreshGate, RefreshResult};
use crate::route::Location;
use crate::session::SessionStore;
use crate::transport::HttpTransport;
use crate::types::Session;

#[derive(Clone)]
pub struct SessionVerifier {
    store: SessionStore,
    gate: RefreshGate,
    location: Arc<dyn Location>,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    quiet_period: Duration,
    bootstrap_wait: Duration,
}

impl SessionVerifier {
    #[must_use]
    pub fn new(
        config: &SessionConfig,
        store: SessionStore,
        gate: RefreshGate,
        location: Arc<dyn Location>,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            gate,
            location,
            transport,
            clock,
            interval: config.verify_interval,
            quiet_period: config.quiet_period,
            bootstrap_wait: config.bootstrap_wait,
        }
    }

    /// Resolve the session at startup. `loading` is published as true until
    /// this returns, which is at most one bootstrap plus `bootstrap_wait`.
    pub async fn mount(&self) -> Session {
        self.store.set_loading(true);
        let mut session = self.store.bootstrap().await;

        if session == Session::Anonymous && self.transport.has_refresh_hint() {
            debug!("anonymous with refresh hint; attempting recovery");
            match tokio::time::timeout(self.bootstrap_wait, self.recover()).await {
                Ok(recovered) => session = recovered,
                Err(_) => {
                    let wait_ms = u64::try_from(self.bootstrap_wait.as_millis()).unwrap_or(u64::MAX);
                    warn!(wait_ms, "session recovery timed out; continuing anonymous");
                }
            }
        }

        self.store.set_loading(false);
        info!(status = ?session.status(), "session mounted");
        session
    }

    async fn recover(&self) -> Session {
        match self.gate.ensure_fresh_token().await {
            Ok(Fresh) => self.store.bootstrap().await,
            Err(e) => {
                debug!(error = %e, "session recovery failed");
                self.store.session()
            }
        }
    }

    /// One verifier tick. Returns `None` when the tick was skipped.
    pub async fn verify_once(&self) -> Option<RefreshResult> {
        if !self.store.session().is_authenticated() {
            return None;
        }
        if !self.location.route_class().wants_refresh() {
            return None;
        }
        let since_bootstrap = self
            .store
            .last_bootstrap_at()
            .map(|at| self.clock.now().saturating_duration_since(at));
        if since_bootstrap.is_some_and(|elapsed| elapsed < self.quiet_period) {
            debug!("bootstrap too recent; skipping verification");
            return None;
        }
        Some(self.gate.ensure_fresh_token().await)
    }

    /// Start the periodic verifier. The first tick comes one quiet period
    /// plus one interval after the call; missed ticks are skipped.
    #[must_use]
    pub fn spawn(&self) -> JoinHandle<()> {
        let verifier = self.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + verifier.quiet_period + verifier.interval;
            let mut ticker = tokio::time::interval_at(start, verifier.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match verifier.verify_once().await {
                    Some(Ok(Fresh)) => debug!("periodic verification refreshed session"),
                    Some(Err(e)) => info!(error = %e, "periodic verification failed"),
                    None => {}
                }
            }
        })
    }
}

#[cfg(test)]
#[path = "verifier_test.rs"]
mod tests;
