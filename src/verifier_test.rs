use std::time::Duration;

use tokio::time::Instant;

use super::*;
use crate::error::RefreshError;
use crate::test_helpers::*;
use crate::types::{SessionEvent, SessionStatus};

// =============================================================================
// mount
// =============================================================================

#[tokio::test(start_paused = true)]
async fn mount_anonymous_without_hint_never_refreshes() {
    let h = Harness::on_runtime_clock("/products");
    h.transport.reply(WHOAMI, 200, WHOAMI_NULL);
    assert!(h.store.snapshot().loading);

    let session = h.verifier.mount().await;

    assert_eq!(session, Session::Anonymous);
    assert!(!h.store.snapshot().loading);
    assert_eq!(h.transport.calls_to(WHOAMI), 1);
    assert_eq!(h.transport.calls_to(REFRESH), 0);
}

#[tokio::test(start_paused = true)]
async fn mount_authenticated_needs_no_recovery() {
    let h = Harness::on_runtime_clock("/orders");
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.transport.set_refresh_hint(true);

    assert_eq!(h.verifier.mount().await, Session::Authenticated(alice()));
    assert_eq!(h.transport.calls_to(REFRESH), 0);
}

#[tokio::test(start_paused = true)]
async fn mount_recovers_when_only_access_credential_expired() {
    let h = Harness::on_runtime_clock("/orders");
    h.transport.reply(WHOAMI, 200, WHOAMI_NULL);
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.transport.reply(REFRESH, 200, "");
    h.transport.set_refresh_hint(true);

    let session = h.verifier.mount().await;

    assert_eq!(session, Session::Authenticated(alice()));
    assert_eq!(h.store.status(), SessionStatus::Authenticated);
    assert_eq!(h.transport.calls_to(WHOAMI), 2);
    assert_eq!(h.transport.calls_to(REFRESH), 1);
    assert!(!h.store.snapshot().loading);
}

#[tokio::test(start_paused = true)]
async fn mount_with_stale_hint_stays_anonymous() {
    let h = Harness::on_runtime_clock("/");
    h.transport.reply(WHOAMI, 200, WHOAMI_NULL);
    h.transport.reply(REFRESH, 401, "");
    h.transport.set_refresh_hint(true);
    let mut events = h.store.events();

    assert_eq!(h.verifier.mount().await, Session::Anonymous);
    assert_eq!(h.transport.calls_to(WHOAMI), 1);
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn mount_stops_waiting_after_bootstrap_wait() {
    let h = Harness::on_runtime_clock("/orders");
    h.transport.reply(WHOAMI, 200, WHOAMI_NULL);
    h.transport.reply(REFRESH, 200, "");
    h.transport.delay(REFRESH, Duration::from_secs(30));
    h.transport.set_refresh_hint(true);

    let started = Instant::now();
    let session = h.verifier.mount().await;
    let waited = started.elapsed();

    assert_eq!(session, Session::Anonymous);
    assert!(!h.store.snapshot().loading);
    assert!(waited >= Duration::from_secs(5), "{waited:?}");
    assert!(waited < Duration::from_secs(30), "{waited:?}");
    assert!(h.gate.live_attempt().is_some());
}

// =============================================================================
// verify_once
// =============================================================================

#[tokio::test(start_paused = true)]
async fn verify_skips_anonymous_sessions() {
    let h = Harness::on_runtime_clock("/orders");
    h.transport.reply(WHOAMI, 200, WHOAMI_NULL);
    h.store.bootstrap().await;
    tokio::time::advance(Duration::from_secs(10)).await;

    assert!(h.verifier.verify_once().await.is_none());
    assert_eq!(h.transport.calls_to(REFRESH), 0);
}

#[tokio::test(start_paused = true)]
async fn verify_skips_public_routes() {
    let h = Harness::on_runtime_clock("/products");
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.store.bootstrap().await;
    tokio::time::advance(Duration::from_secs(10)).await;

    assert!(h.verifier.verify_once().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn verify_waits_out_quiet_period_after_bootstrap() {
    let h = Harness::on_runtime_clock("/orders");
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.transport.reply(REFRESH, 200, "");
    h.store.bootstrap().await;

    tokio::time::advance(2 * SECOND).await;
    assert!(h.verifier.verify_once().await.is_none());

    tokio::time::advance(2 * SECOND).await;
    assert_eq!(h.verifier.verify_once().await, Some(Ok(Fresh)));
    assert_eq!(h.transport.calls_to(REFRESH), 1);
}

#[tokio::test(start_paused = true)]
async fn verify_runs_on_auth_pages() {
    let h = Harness::on_runtime_clock("/register");
    h.login_alice().await;
    h.transport.reply(REFRESH, 200, "");

    assert_eq!(h.verifier.verify_once().await, Some(Ok(Fresh)));
}

// =============================================================================
// spawn
// =============================================================================

#[tokio::test(start_paused = true)]
async fn periodic_verifier_ticks_after_quiet_period_and_interval() {
    let h = Harness::on_runtime_clock("/orders");
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.transport.reply(REFRESH, 200, "");
    h.verifier.mount().await;

    let handle = h.verifier.spawn();

    tokio::time::sleep(Duration::from_secs(62)).await;
    assert_eq!(h.transport.calls_to(REFRESH), 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(h.transport.calls_to(REFRESH), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.calls_to(REFRESH), 2);

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn periodic_verifier_idles_on_public_routes() {
    let h = Harness::on_runtime_clock("/products");
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.verifier.mount().await;

    let handle = h.verifier.spawn();
    tokio::time::sleep(Duration::from_secs(300)).await;

    assert_eq!(h.transport.calls_to(REFRESH), 0);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn periodic_verifier_resumes_after_navigation() {
    let h = Harness::on_runtime_clock("/products");
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.transport.reply(REFRESH, 200, "");
    h.verifier.mount().await;

    let handle = h.verifier.spawn();
    tokio::time::sleep(Duration::from_secs(100)).await;
    assert_eq!(h.transport.calls_to(REFRESH), 0);

    h.location.navigate("/profile");
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(h.transport.calls_to(REFRESH), 1);

    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn periodic_verifier_expires_session_when_refresh_rejected() {
    let h = Harness::on_runtime_clock("/orders");
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.transport.reply(REFRESH, 401, "");
    h.verifier.mount().await;
    let mut events = h.store.events();

    let handle = h.verifier.spawn();
    tokio::time::sleep(Duration::from_secs(64)).await;

    assert_eq!(h.store.session(), Session::Anonymous);
    assert!(matches!(
        events.try_recv(),
        Ok(SessionEvent::Expired { reason: crate::types::ExpiryReason::RefreshRejected, .. })
    ));

    // Anonymous now: later ticks do nothing.
    tokio::time::sleep(Duration::from_secs(180)).await;
    assert_eq!(h.transport.calls_to(REFRESH), 1);
    handle.abort();
}

#[tokio::test(start_paused = true)]
async fn periodic_rate_limit_keeps_session() {
    let h = Harness::on_runtime_clock("/orders");
    h.transport.reply(WHOAMI, 200, &whoami_alice());
    h.transport.reply(REFRESH, 429, "");
    h.verifier.mount().await;

    let handle = h.verifier.spawn();
    tokio::time::sleep(Duration::from_secs(64)).await;

    assert_eq!(h.transport.calls_to(REFRESH), 1);
    assert!(h.store.session().is_authenticated());
    assert_eq!(h.gate.ensure_fresh_token().await, Err(RefreshError::RateLimited));
    handle.abort();
}
