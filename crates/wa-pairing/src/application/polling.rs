//! The per-session polling loop.
//!
//! One [`PollingLoop`] task runs per pairing session.  It sleeps for the
//! policy interval, runs a tick, and repeats until a tick tells it to stop.
//!
//! # A tick, step by step
//!
//! 1. Under the controller lock: stop if the epoch is stale or the session is
//!    terminal; otherwise bump the attempt counter and stop with `timeout` if
//!    the budget is spent.  (`ConnectionSession::begin_tick`)
//! 2. Without the lock: ask the gateway for the session status.
//! 3. Under the lock again: drop the answer if the epoch moved on while the
//!    request was in flight; otherwise record it (`connected` ends the loop).
//!
//! A failed status query is logged and the loop carries on.  Ticks never
//! overlap: the next sleep only starts after the current query returns.

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::time;
use tracing::{debug, info, warn};

use wa_pairing_core::{PairingError, PairingGateway, TickDecision};

use super::controller::Shared;

/// Background task state for one session epoch.
pub(crate) struct PollingLoop {
    shared: Weak<Shared>,
    gateway: Arc<dyn PairingGateway>,
    interval: Duration,
    epoch: u64,
}

impl PollingLoop {
    pub(crate) fn new(
        shared: Weak<Shared>,
        gateway: Arc<dyn PairingGateway>,
        interval: Duration,
        epoch: u64,
    ) -> Self {
        Self {
            shared,
            gateway,
            interval,
            epoch,
        }
    }

    /// Ticks every `interval` until the session ends or is superseded.
    pub(crate) async fn run(self) {
        loop {
            time::sleep(self.interval).await;
            if self.tick().await.is_break() {
                break;
            }
        }
        debug!(epoch = self.epoch, "polling loop exited");
    }

    async fn tick(&self) -> ControlFlow<()> {
        // Every controller handle is gone: nobody is left to observe the result.
        let Some(shared) = self.shared.upgrade() else {
            return ControlFlow::Break(());
        };

        let decision = shared.with_session(self.epoch, |session| {
            (session.begin_tick(), session.attempt(), session.max_attempts())
        });

        let session_id = match decision {
            None | Some((TickDecision::Stop, _, _)) => return ControlFlow::Break(()),
            Some((TickDecision::TimedOut, attempt, _)) => {
                let reason = PairingError::Timeout { attempts: attempt };
                info!(epoch = self.epoch, "{reason}");
                return ControlFlow::Break(());
            }
            Some((TickDecision::Query(session_id), attempt, max_attempts)) => {
                debug!(epoch = self.epoch, %session_id, attempt, max_attempts, "polling session status");
                session_id
            }
        };
        // Release the strong reference before waiting on the network so a
        // dropped controller is not kept alive by an in-flight request.
        drop(shared);

        let status = self.gateway.session_status(&session_id).await;

        let Some(shared) = self.shared.upgrade() else {
            return ControlFlow::Break(());
        };
        match status {
            Ok(status) => match shared.with_session(self.epoch, |s| s.record_status(status)) {
                None => {
                    debug!(epoch = self.epoch, "discarding status for superseded session");
                    ControlFlow::Break(())
                }
                Some(true) => {
                    info!(epoch = self.epoch, %session_id, "WhatsApp account linked");
                    ControlFlow::Break(())
                }
                Some(false) => ControlFlow::Continue(()),
            },
            Err(e) => {
                warn!(epoch = self.epoch, error = %PairingError::TransientPoll(e), "continuing to poll");
                ControlFlow::Continue(())
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use wa_pairing_core::{
        ConnectionSession, CreatedSession, MockPairingGateway, PairingImage, SessionId,
        SessionState, SessionStatus,
    };

    const INTERVAL: Duration = Duration::from_secs(2);

    fn ready_session(id: &str) -> ConnectionSession {
        let mut session = ConnectionSession::new(30);
        session.mark_pairing_ready(CreatedSession {
            session_id: SessionId::new(id),
            pairing_image: PairingImage::new("qr"),
        });
        session
    }

    /// Installs a ready session and returns its epoch.
    fn install(shared: &Shared, id: &str) -> u64 {
        shared.lock().reset(Some(ready_session(id)))
    }

    fn current_session(shared: &Shared) -> Option<ConnectionSession> {
        shared.lock().session.clone()
    }

    #[tokio::test]
    async fn test_tick_records_waiting_answer_and_continues() {
        // Arrange
        let shared = Arc::new(Shared::new());
        let epoch = install(&shared, "s1");
        let mut gateway = MockPairingGateway::new();
        gateway
            .expect_session_status()
            .withf(|id| id.as_str() == "s1")
            .times(1)
            .returning(|_| Ok(SessionStatus { connected: false }));
        let polling = PollingLoop::new(Arc::downgrade(&shared), Arc::new(gateway), INTERVAL, epoch);

        // Act
        let flow = polling.tick().await;

        // Assert
        assert!(flow.is_continue());
        let session = current_session(&shared).unwrap();
        assert_eq!(session.state(), SessionState::PairingReady);
        assert_eq!(session.attempt(), 1);
    }

    #[tokio::test]
    async fn test_answer_arriving_after_retry_is_discarded() {
        // Arrange: while the query for "old" is out, a retry installs "new".
        let shared = Arc::new(Shared::new());
        let epoch = install(&shared, "old");
        let retrier = Arc::clone(&shared);
        let mut gateway = MockPairingGateway::new();
        gateway
            .expect_session_status()
            .times(1)
            .returning(move |_| {
                install(&retrier, "new");
                Ok(SessionStatus { connected: true })
            });
        let polling = PollingLoop::new(Arc::downgrade(&shared), Arc::new(gateway), INTERVAL, epoch);

        // Act: the "linked" answer for "old" comes back under a newer epoch
        let flow = polling.tick().await;

        // Assert: the loop exits and the new session is untouched
        assert!(flow.is_break());
        let session = current_session(&shared).unwrap();
        assert_eq!(session.session_id().map(SessionId::as_str), Some("new"));
        assert_eq!(session.state(), SessionState::PairingReady);
        assert_eq!(session.attempt(), 0);
    }

    #[tokio::test]
    async fn test_stale_epoch_stops_before_querying() {
        let shared = Arc::new(Shared::new());
        let stale = install(&shared, "old");
        install(&shared, "new");
        let mut gateway = MockPairingGateway::new();
        gateway.expect_session_status().never();
        let polling = PollingLoop::new(Arc::downgrade(&shared), Arc::new(gateway), INTERVAL, stale);

        assert!(polling.tick().await.is_break());
        assert_eq!(current_session(&shared).unwrap().attempt(), 0);
    }

    #[tokio::test]
    async fn test_tick_stops_once_controller_is_gone() {
        let shared = Arc::new(Shared::new());
        let epoch = install(&shared, "s1");
        let weak = Arc::downgrade(&shared);
        drop(shared);
        let mut gateway = MockPairingGateway::new();
        gateway.expect_session_status().never();
        let polling = PollingLoop::new(weak, Arc::new(gateway), INTERVAL, epoch);

        assert!(polling.tick().await.is_break());
    }
}
