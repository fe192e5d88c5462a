//! Integration tests for the connection controller and its polling loop.
//!
//! # Purpose
//!
//! These tests drive `ConnectionController` through its public API against
//! the scripted in-memory gateway, the same way the command-line front end
//! drives it against the real REST gateway.  They verify:
//!
//! - The happy path: a session becomes `Connected` on the tick whose status
//!   query first reports the account as linked, and polling stops there.
//! - The timeout path: with no link, the session times out on tick
//!   `max_attempts` after `max_attempts - 1` status queries.
//! - Resilience: failing status queries are skipped, not fatal.
//! - Lifecycle: `retry` leaves exactly one polling loop running, `close`
//!   stops all gateway traffic, and answers for a superseded session
//!   (session creation or status query) are never applied to the new one.
//!
//! # Time
//!
//! Every test runs on tokio's paused clock (`start_paused = true`).  The
//! runtime jumps straight to the next timer whenever all tasks are idle, so a
//! 60-second timeout completes instantly and deterministically.
//!
//! ```text
//! t=0      start_session  → PairingReady
//! t=2s     tick 1         → status query 1
//! t=4s     tick 2         → status query 2
//! ...
//! t=60s    tick 30        → Timeout (no query)
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use wa_pairing::application::ConnectionController;
use wa_pairing::infrastructure::gateway::ScriptedGateway;
use wa_pairing_core::domain::session::TIMEOUT_MESSAGE;
use wa_pairing_core::{
    GatewayError, PairingError, PollingPolicy, SessionId, SessionState, SessionStatus,
};

const INTERVAL: Duration = Duration::from_secs(2);

fn policy() -> PollingPolicy {
    PollingPolicy::new(INTERVAL, 30)
}

fn controller(gateway: &Arc<ScriptedGateway>) -> ConnectionController {
    ConnectionController::new(gateway.clone(), policy())
}

/// Asserts that `elapsed` is `ticks` intervals, give or take half an interval.
fn assert_ticks_elapsed(elapsed: Duration, ticks: u32) {
    let expected = INTERVAL * ticks;
    assert!(
        elapsed >= expected && elapsed < expected + INTERVAL / 2,
        "expected ~{expected:?}, got {elapsed:?}"
    );
}

// ── Terminal outcomes ─────────────────────────────────────────────────────────

/// The session connects on the tick whose query first reports a link.
#[tokio::test(start_paused = true)]
async fn test_connects_on_nth_tick_and_stops_polling() {
    // Arrange: the gateway reports the link on the 3rd status query.
    let gateway = Arc::new(ScriptedGateway::new().connect_on_call(3));
    let controller = controller(&gateway);
    let started = Instant::now();

    // Act
    controller.start_session().await.expect("session created");
    let terminal = controller.wait_for_terminal().await.expect("terminal session");

    // Assert
    assert_eq!(terminal.state(), SessionState::Connected);
    assert_eq!(terminal.attempt(), 3);
    assert!(terminal.last_error().is_none());
    assert_ticks_elapsed(started.elapsed(), 3);
    assert!(!controller.is_polling(), "timer must be cleared on Connected");

    // No further queries once connected.
    sleep(INTERVAL * 10).await;
    assert_eq!(gateway.status_calls("session-1"), 3);
}

/// Without a link the session times out on tick 30 after 29 queries.
#[tokio::test(start_paused = true)]
async fn test_times_out_after_max_attempts() {
    // Arrange
    let gateway = Arc::new(ScriptedGateway::new());
    let controller = controller(&gateway);
    let started = Instant::now();

    // Act
    controller.start_session().await.expect("session created");
    let terminal = controller.wait_for_terminal().await.expect("terminal session");

    // Assert
    assert_eq!(terminal.state(), SessionState::Timeout);
    assert_eq!(terminal.attempt(), 30);
    assert_eq!(terminal.last_error(), Some(TIMEOUT_MESSAGE));
    assert_eq!(gateway.status_calls("session-1"), 29);
    assert_ticks_elapsed(started.elapsed(), 30);
    assert!(!controller.is_polling());

    sleep(INTERVAL * 10).await;
    assert_eq!(gateway.status_calls("session-1"), 29);
}

/// Failing status queries are skipped; the next success still counts.
#[tokio::test(start_paused = true)]
async fn test_transient_status_errors_do_not_stop_polling() {
    // Arrange: odd calls fail, the 4th call reports the link.
    let gateway = Arc::new(ScriptedGateway::new().with_status(|_, call| {
        if call % 2 == 1 {
            Err(GatewayError::Transport("connection reset".into()))
        } else {
            Ok(SessionStatus {
                connected: call >= 4,
            })
        }
    }));
    let controller = controller(&gateway);

    // Act
    controller.start_session().await.expect("session created");
    let terminal = controller.wait_for_terminal().await.expect("terminal session");

    // Assert
    assert_eq!(terminal.state(), SessionState::Connected);
    assert_eq!(terminal.attempt(), 4);
    assert!(terminal.last_error().is_none(), "transient errors are not surfaced");
}

/// A gateway that never answers successfully still times out on schedule.
#[tokio::test(start_paused = true)]
async fn test_permanent_status_errors_still_time_out() {
    let gateway = Arc::new(ScriptedGateway::new().with_status(|_, _| {
        Err(GatewayError::Status {
            status: 502,
            message: "bad gateway".into(),
        })
    }));
    let controller = controller(&gateway);

    controller.start_session().await.expect("session created");
    let terminal = controller.wait_for_terminal().await.expect("terminal session");

    assert_eq!(terminal.state(), SessionState::Timeout);
    assert_eq!(gateway.status_calls("session-1"), 29);
}

// ── Session creation ──────────────────────────────────────────────────────────

/// A creation failure is fatal for the attempt; retry starts a new one.
#[tokio::test(start_paused = true)]
async fn test_creation_failure_then_retry_succeeds() {
    // Arrange
    let gateway = Arc::new(ScriptedGateway::new().connect_on_call(1).queue_creation(Err(
        GatewayError::Status {
            status: 503,
            message: "gateway starting".into(),
        },
    )));
    let controller = controller(&gateway);

    // Act: first attempt fails
    let first = controller.start_session().await;

    // Assert
    assert!(matches!(first, Err(PairingError::SessionCreation(_))));
    let failed = controller.snapshot().expect("session kept for display");
    assert_eq!(failed.state(), SessionState::Error);
    assert!(failed.last_error().unwrap_or_default().contains("gateway starting"));
    assert!(!controller.is_polling());

    // Act: retry
    let retried = controller.retry().await.expect("retry creates a session");
    let terminal = controller.wait_for_terminal().await.expect("terminal session");

    // Assert
    assert_eq!(retried.session_id().map(SessionId::as_str), Some("session-2"));
    assert_eq!(terminal.state(), SessionState::Connected);
    assert_eq!(terminal.attempt(), 1);
}

// ── Lifecycle: retry, close, drop ─────────────────────────────────────────────

/// Retry while the first `create_session` is still in flight: the first
/// attempt reports `Superseded` and only the retried session polls.
#[tokio::test(start_paused = true)]
async fn test_retry_during_creation_supersedes_first_attempt() {
    // Arrange: every creation takes 1s
    let gateway = Arc::new(ScriptedGateway::new().with_creation_latency(Duration::from_secs(1)));
    let controller = controller(&gateway);
    let first = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start_session().await })
    };
    sleep(Duration::from_millis(250)).await;

    // Act
    let second = controller.retry().await;
    let first = first.await.expect("first attempt task");
    sleep(INTERVAL * 2 + INTERVAL / 2).await;

    // Assert
    assert!(matches!(first, Err(PairingError::Superseded)));
    let second = second.expect("retry creates a session");
    assert_eq!(second.session_id().map(SessionId::as_str), Some("session-2"));
    assert_eq!(gateway.status_calls("session-1"), 0);
    assert_eq!(gateway.status_calls("session-2"), 2);
    let current = controller.snapshot().expect("session open");
    assert_eq!(current.session_id().map(SessionId::as_str), Some("session-2"));
    assert_eq!(current.attempt(), 2);

    controller.close();
}

/// Close while `create_session` is in flight: the late answer is discarded
/// and no polling ever starts.
#[tokio::test(start_paused = true)]
async fn test_close_during_creation_starts_no_polling() {
    // Arrange
    let gateway = Arc::new(ScriptedGateway::new().with_creation_latency(Duration::from_secs(1)));
    let controller = controller(&gateway);
    let pending = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.start_session().await })
    };
    sleep(Duration::from_millis(250)).await;

    // Act
    controller.close();
    let result = pending.await.expect("start_session task");
    sleep(INTERVAL * 10).await;

    // Assert
    assert!(matches!(result, Err(PairingError::Superseded)));
    assert!(controller.snapshot().is_none());
    assert!(!controller.is_polling());
    assert_eq!(gateway.total_status_calls(), 0);
}

/// Retry discards the old session: its loop stops and only one loop runs.
#[tokio::test(start_paused = true)]
async fn test_retry_replaces_session_and_runs_single_loop() {
    // Arrange: two ticks of session-1
    let gateway = Arc::new(ScriptedGateway::new());
    let controller = controller(&gateway);
    controller.start_session().await.expect("session created");
    sleep(INTERVAL * 2 + INTERVAL / 2).await;
    assert_eq!(gateway.status_calls("session-1"), 2);

    // Act
    let retried = controller.retry().await.expect("retry creates a session");
    sleep(INTERVAL * 3 + INTERVAL / 2).await;

    // Assert: session-1 is frozen, session-2 ticks alone from attempt 0
    assert_eq!(retried.session_id().map(SessionId::as_str), Some("session-2"));
    assert_eq!(retried.attempt(), 0);
    assert_eq!(gateway.status_calls("session-1"), 2);
    assert_eq!(gateway.status_calls("session-2"), 3);
    let current = controller.snapshot().expect("session open");
    assert_eq!(current.state(), SessionState::PairingReady);
    assert_eq!(current.attempt(), 3);
    assert!(controller.is_polling());

    controller.close();
}

/// Repeated retries never stack polling loops.
#[tokio::test(start_paused = true)]
async fn test_rapid_retries_leave_one_loop() {
    let gateway = Arc::new(ScriptedGateway::new());
    let controller = controller(&gateway);

    for _ in 0..5 {
        controller.retry().await.expect("retry creates a session");
    }
    sleep(INTERVAL * 4 + INTERVAL / 2).await;

    assert_eq!(gateway.sessions_created(), 5);
    assert_eq!(gateway.total_status_calls(), 4);
    assert_eq!(gateway.status_calls("session-5"), 4);
    controller.close();
}

/// Close stops all gateway traffic and clears the snapshot.
#[tokio::test(start_paused = true)]
async fn test_close_stops_polling_immediately() {
    // Arrange
    let gateway = Arc::new(ScriptedGateway::new());
    let controller = controller(&gateway);
    controller.start_session().await.expect("session created");
    sleep(INTERVAL + INTERVAL / 2).await;
    assert_eq!(gateway.total_status_calls(), 1);

    // Act
    controller.close();
    sleep(INTERVAL * 20).await;

    // Assert
    assert_eq!(gateway.total_status_calls(), 1);
    assert!(controller.snapshot().is_none());
    assert!(!controller.is_polling());
    assert!(controller.wait_for_terminal().await.is_none());
}

/// Closing while a waiter is parked resolves the waiter with `None`.
#[tokio::test(start_paused = true)]
async fn test_close_releases_wait_for_terminal() {
    let gateway = Arc::new(ScriptedGateway::new());
    let controller = controller(&gateway);
    controller.start_session().await.expect("session created");

    let waiter = {
        let controller = controller.clone();
        tokio::spawn(async move { controller.wait_for_terminal().await })
    };
    sleep(INTERVAL * 3).await;
    controller.close();

    let outcome = waiter.await.expect("waiter task");
    assert!(outcome.is_none());
}

/// Dropping every controller handle stops the loop at its next tick.
#[tokio::test(start_paused = true)]
async fn test_dropping_controller_stops_polling() {
    let gateway = Arc::new(ScriptedGateway::new());
    let controller = controller(&gateway);
    controller.start_session().await.expect("session created");
    sleep(INTERVAL + INTERVAL / 2).await;

    drop(controller);
    sleep(INTERVAL * 10).await;

    assert_eq!(gateway.total_status_calls(), 1);
}

// ── Stale answers ─────────────────────────────────────────────────────────────

/// Retrying while a status query is in flight cancels that query; its
/// "linked" answer never reaches the new session.
#[tokio::test(start_paused = true)]
async fn test_retry_cancels_in_flight_query_for_old_session() {
    // Arrange: session-1 would report a link, but each query takes 1s.
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with_status(|id, _| {
                Ok(SessionStatus {
                    connected: id.as_str() == "session-1",
                })
            })
            .with_status_latency(Duration::from_secs(1)),
    );
    let controller = controller(&gateway);
    controller.start_session().await.expect("session created");

    // Act: tick 1 fires at 2s; retry at 2.5s while its query is in flight.
    sleep(INTERVAL + INTERVAL / 4).await;
    assert_eq!(gateway.status_calls("session-1"), 1);
    controller.retry().await.expect("retry creates a session");
    sleep(INTERVAL * 2).await;

    // Assert: session-2 is still waiting; the linked answer went nowhere.
    let current = controller.snapshot().expect("session open");
    assert_eq!(current.session_id().map(SessionId::as_str), Some("session-2"));
    assert_eq!(current.state(), SessionState::PairingReady);
    assert!(controller.is_polling());

    controller.close();
}

/// Subscribers observe the whole progression, ending in a terminal state.
#[tokio::test(start_paused = true)]
async fn test_subscriber_sees_progress_until_connected() {
    // Arrange
    let gateway = Arc::new(ScriptedGateway::new().connect_on_call(2));
    let controller = controller(&gateway);
    let mut rx = controller.subscribe();
    let collector = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let snapshot = rx.borrow_and_update().clone();
            if let Some(session) = snapshot {
                seen.push((session.state(), session.attempt()));
                if session.is_terminal() {
                    break;
                }
            }
        }
        seen
    });

    // Act
    controller.start_session().await.expect("session created");
    let seen = collector.await.expect("collector task");

    // Assert: monotonic progression, one terminal state at the end
    assert!(seen.first().is_some_and(|(state, _)| !state.is_terminal()));
    assert_eq!(seen.last(), Some(&(SessionState::Connected, 2)));
    assert_eq!(
        seen.iter().filter(|(state, _)| state.is_terminal()).count(),
        1
    );
    assert!(seen.windows(2).all(|w| w[0].1 <= w[1].1));
}
