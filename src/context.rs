//! Session context: one store, gate, API client and verifier wired around a
//! single transport, location and clock.
//!
//! This is what UI code holds. It owns the lifecycle: `mount` once at
//! startup, `start_verifier` while the app is live, `teardown` on exit.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use crate::clock::{Clock, RuntimeClock};
use crate::config::SessionConfig;
use crate::error::{ApiError, ConfigError};
use crate::gate::RefreshGate;
use crate::pipeline::ApiClient;
use crate::route::Location;
use crate::session::SessionStore;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{AuthState, Credentials, Identity, Session, SessionEvent};
use crate::verifier::SessionVerifier;

pub struct SessionContext {
    store: SessionStore,
    gate: RefreshGate,
    api: ApiClient,
    verifier: SessionVerifier,
    location: Arc<dyn Location>,
    verifier_task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionContext {
    #[must_use]
    pub fn new(config: &SessionConfig, transport: Arc<dyn HttpTransport>, location: Arc<dyn Location>) -> Self {
        Self::with_clock(config, transport, location, Arc::new(RuntimeClock))
    }

    #[must_use]
    pub fn with_clock(
        config: &SessionConfig,
        transport: Arc<dyn HttpTransport>,
        location: Arc<dyn Location>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let store = SessionStore::new(config, Arc::clone(&transport), Arc::clone(&clock));
        let gate = RefreshGate::new(
            config,
            Arc::clone(&transport),
            store.clone(),
            Arc::clone(&location),
            Arc::clone(&clock),
        );
        let api = ApiClient::new(config, Arc::clone(&transport), gate.clone(), Arc::clone(&location));
        let verifier =
            SessionVerifier::new(config, store.clone(), gate.clone(), Arc::clone(&location), transport, clock);
        Self { store, gate, api, verifier, location, verifier_task: Mutex::new(None) }
    }

    /// Build a context over a real HTTP transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP transport cannot be built from `config`.
    pub fn from_config(config: &SessionConfig, location: Arc<dyn Location>) -> Result<Self, ConfigError> {
        let transport = ReqwestTransport::new(config)?;
        Ok(Self::new(config, Arc::new(transport), location))
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    #[must_use]
    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    #[must_use]
    pub fn gate(&self) -> &RefreshGate {
        &self.gate
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    #[must_use]
    pub fn location(&self) -> &Arc<dyn Location> {
        &self.location
    }

    #[must_use]
    pub fn session(&self) -> Session {
        self.store.session()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.store.subscribe()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.store.events()
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    pub async fn mount(&self) -> Session {
        self.verifier.mount().await
    }

    /// Start the periodic verifier, replacing any running one.
    pub fn start_verifier(&self) {
        let handle = self.verifier.spawn();
        if let Some(previous) = self.lock_task().replace(handle) {
            previous.abort();
        }
    }

    #[must_use]
    pub fn verifier_running(&self) -> bool {
        self.lock_task().as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop background work. In-flight refreshes still run to completion.
    pub fn teardown(&self) {
        if let Some(task) = self.lock_task().take() {
            task.abort();
        }
    }

    /// # Errors
    ///
    /// See [`SessionStore::login`].
    pub async fn login(&self, credentials: &Credentials) -> Result<Identity, ApiError> {
        self.store.login(credentials).await
    }

    pub async fn logout(&self) {
        self.store.logout().await;
    }

    fn lock_task(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.verifier_task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
