//! Shared fixtures for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::clock::{Clock, ManualClock, RuntimeClock};
use crate::config::SessionConfig;
use crate::error::TransportError;
use crate::gate::RefreshGate;
use crate::pipeline::ApiClient;
use crate::route::SharedLocation;
use crate::session::SessionStore;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport};
use crate::types::{Identity, Role};
use crate::verifier::SessionVerifier;

pub const WHOAMI: &str = "/api/auth/me";
pub const LOGIN: &str = "/api/auth/login";
pub const REFRESH: &str = "/api/auth/refresh";
pub const LOGOUT: &str = "/api/auth/logout";

#[derive(Clone, Debug)]
pub enum MockReply {
    Status(u16, String),
    Fail(String),
}

/// Scripted transport. Each path has a reply queue; once it drains, the last
/// reply served keeps being served. Unscripted paths answer 404.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<MockReply>>>,
    sticky: Mutex<HashMap<String, MockReply>>,
    calls: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
    path_latency: Mutex<HashMap<String, Duration>>,
    refresh_hint: AtomicBool,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, path: &str, status: u16, body: &str) {
        self.push(path, MockReply::Status(status, body.to_owned()));
    }

    pub fn fail(&self, path: &str, message: &str) {
        self.push(path, MockReply::Fail(message.to_owned()));
    }

    fn push(&self, path: &str, reply: MockReply) {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_owned())
            .or_default()
            .push_back(reply);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    /// Latency for one path, overriding the global one.
    pub fn delay(&self, path: &str, latency: Duration) {
        self.path_latency.lock().unwrap().insert(path.to_owned(), latency);
    }

    pub fn set_refresh_hint(&self, present: bool) {
        self.refresh_hint.store(present, Ordering::SeqCst);
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
    }

    fn next_reply(&self, path: &str) -> MockReply {
        let queued = self.replies.lock().unwrap().get_mut(path).and_then(VecDeque::pop_front);
        let mut sticky = self.sticky.lock().unwrap();
        match queued {
            Some(reply) => {
                sticky.insert(path.to_owned(), reply.clone());
                reply
            }
            None => sticky.get(path).cloned().unwrap_or(MockReply::Status(404, String::new())),
        }
    }
}

#[async_trait::async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls.lock().unwrap().push(request.path().to_owned());
        let reply = self.next_reply(request.path());
        let latency = self
            .path_latency
            .lock()
            .unwrap()
            .get(request.path())
            .copied()
            .unwrap_or(*self.latency.lock().unwrap());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        match reply {
            MockReply::Status(status, body) => Ok(ApiResponse { status, body }),
            MockReply::Fail(message) => Err(TransportError(message)),
        }
    }

    fn has_refresh_hint(&self) -> bool {
        self.refresh_hint.load(Ordering::SeqCst)
    }
}

pub fn alice() -> Identity {
    Identity { id: "7".into(), name: "Alice".into(), email: "alice@example.test".into(), role: Role::Customer }
}

pub fn alice_json() -> String {
    serde_json::json!({ "id": 7, "name": "Alice", "email": "alice@example.test", "role": "customer" }).to_string()
}

pub fn whoami_alice() -> String {
    format!(r#"{{"identity": {}}}"#, alice_json())
}

pub const WHOAMI_NULL: &str = r#"{"identity": null}"#;

/// Store, gate and client wired around one mock transport.
pub struct Harness {
    pub transport: Arc<MockTransport>,
    pub location: SharedLocation,
    pub clock: Arc<ManualClock>,
    pub store: SessionStore,
    pub gate: RefreshGate,
    pub client: ApiClient,
    pub verifier: SessionVerifier,
}

impl Harness {
    /// Harness on `path` driven by a [`ManualClock`].
    pub fn on(path: &str) -> Self {
        let clock = Arc::new(ManualClock::new());
        Self::build(path, Arc::clone(&clock) as Arc<dyn Clock>, clock)
    }

    /// Harness whose components read tokio's (pausable) clock.
    pub fn on_runtime_clock(path: &str) -> Self {
        Self::build(path, Arc::new(RuntimeClock), Arc::new(ManualClock::new()))
    }

    fn build(path: &str, clock: Arc<dyn Clock>, manual: Arc<ManualClock>) -> Self {
        let config = SessionConfig::default();
        let transport = MockTransport::new();
        let location = SharedLocation::new(path);
        let store = SessionStore::new(&config, transport.clone(), Arc::clone(&clock));
        let gate = RefreshGate::new(
            &config,
            transport.clone(),
            store.clone(),
            Arc::new(location.clone()),
            Arc::clone(&clock),
        );
        let client = ApiClient::new(&config, transport.clone(), gate.clone(), Arc::new(location.clone()));
        let verifier = SessionVerifier::new(
            &config,
            store.clone(),
            gate.clone(),
            Arc::new(location.clone()),
            transport.clone(),
            Arc::clone(&clock),
        );
        Self { transport, location, clock: manual, store, gate, client, verifier }
    }

    /// Log Alice in through the store.
    pub async fn login_alice(&self) {
        self.transport.reply(LOGIN, 200, &alice_json());
        self.store
            .login(&crate::types::Credentials::new("alice@example.test", "pw"))
            .await
            .unwrap();
    }
}

pub const SECOND: Duration = Duration::from_secs(1);
