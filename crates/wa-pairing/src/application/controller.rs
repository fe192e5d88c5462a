//! ConnectionController: drives one WhatsApp pairing attempt end-to-end.
//!
//! The controller is what the "Connect WhatsApp" dialog talks to.  Opening
//! the dialog calls [`ConnectionController::start_session`], the retry button
//! calls [`ConnectionController::retry`], and closing the dialog calls
//! [`ConnectionController::close`].  The dialog renders whatever
//! [`ConnectionController::subscribe`] publishes.
//!
//! # Epochs (for beginners)
//!
//! Every `start_session`, `retry`, and `close` bumps an *epoch* counter.
//! Each asynchronous piece of work (the `create_session` call, every polling
//! tick) remembers the epoch it was started under and, when it finishes,
//! applies its result only if the epoch is still current.  A slow gateway
//! answer that belongs to a session the user already retried or closed is
//! therefore dropped instead of corrupting the new session.
//!
//! ```text
//! epoch 1: start ── create ── tick ── tick ─┐
//! epoch 2:                          retry ──┴── create ── tick ── ...
//!                                     ▲
//!                 epoch-1 tick result arriving here is ignored
//! ```
//!
//! # Locking
//!
//! The state lives behind a `std::sync::Mutex` because every critical
//! section is short and synchronous.  The lock is never held across an
//! `.await`, which is also what lets `close` be a plain (non-async) method
//! that has cancelled the polling task by the time it returns.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use wa_pairing_core::{ConnectionSession, PairingError, PairingGateway, PollingPolicy};

use super::polling::PollingLoop;

/// Mutable controller state, guarded by [`Shared::state`].
#[derive(Debug, Default)]
pub(crate) struct ControllerState {
    /// Bumped by every `start_session`, `retry`, and `close`.
    pub(crate) epoch: u64,
    /// `None` until the dialog opens and after it closes.
    pub(crate) session: Option<ConnectionSession>,
    /// Handle of the polling task for the current epoch, if one is running.
    pub(crate) poll_task: Option<JoinHandle<()>>,
}

impl ControllerState {
    /// Discards the current session and its polling task, installs `next`,
    /// and returns the new epoch.
    pub(crate) fn reset(&mut self, next: Option<ConnectionSession>) -> u64 {
        self.epoch += 1;
        if let Some(task) = self.poll_task.take() {
            task.abort();
        }
        self.session = next;
        self.epoch
    }
}

/// State shared between the controller handles and the polling task.
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<ControllerState>,
    snapshots: watch::Sender<Option<ConnectionSession>>,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (snapshots, _) = watch::channel(None);
        Self {
            state: Mutex::new(ControllerState::default()),
            snapshots,
        }
    }

    /// Locks the state.  A panic while holding the lock cannot leave the
    /// session half-updated (every mutation is a single method call), so a
    /// poisoned lock is recovered rather than propagated.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &ControllerState) {
        self.snapshots.send_replace(state.session.clone());
    }

    /// Applies `f` to the session if `epoch` is still current, publishes the
    /// result, and releases the polling task once the session is terminal.
    ///
    /// Returns `None` when the epoch is stale or no session exists.
    pub(crate) fn with_session<R>(
        &self,
        epoch: u64,
        f: impl FnOnce(&mut ConnectionSession) -> R,
    ) -> Option<R> {
        let mut state = self.lock();
        if state.epoch != epoch {
            return None;
        }
        let session = state.session.as_mut()?;
        let result = f(session);
        if session.is_terminal() {
            // Dropping the handle detaches the task; it is already on its
            // way out of the loop.
            state.poll_task = None;
        }
        self.publish(&state);
        Some(result)
    }
}

/// Owns the lifecycle of one pairing attempt at a time.
///
/// Cloning is cheap; all clones drive the same session.  Dropping every
/// clone stops the polling loop at its next tick.
#[derive(Clone)]
pub struct ConnectionController {
    gateway: Arc<dyn PairingGateway>,
    policy: PollingPolicy,
    shared: Arc<Shared>,
}

impl ConnectionController {
    pub fn new(gateway: Arc<dyn PairingGateway>, policy: PollingPolicy) -> Self {
        Self {
            gateway,
            policy,
            shared: Arc::new(Shared::new()),
        }
    }

    pub fn policy(&self) -> PollingPolicy {
        self.policy
    }

    /// Opens a new pairing attempt.
    ///
    /// Any previous session and its polling loop are discarded first.  On
    /// success the session is `PairingReady`, polling has started, and the
    /// snapshot is returned.
    ///
    /// # Errors
    ///
    /// - [`PairingError::SessionCreation`] if the gateway refused to create
    ///   the session.  The session is left in `Error` with the message.
    /// - [`PairingError::Superseded`] if `retry` or `close` was called while
    ///   the gateway call was in flight.  Its result is discarded.
    pub async fn start_session(&self) -> Result<ConnectionSession, PairingError> {
        let epoch = {
            let mut state = self.shared.lock();
            let epoch = state.reset(Some(ConnectionSession::new(self.policy.max_attempts)));
            self.shared.publish(&state);
            epoch
        };
        info!(epoch, "requesting a new pairing session");

        let created = self.gateway.create_session().await;

        let mut state = self.shared.lock();
        if state.epoch != epoch {
            debug!(epoch, current = state.epoch, "discarding superseded create_session result");
            return Err(PairingError::Superseded);
        }
        let Some(session) = state.session.as_mut() else {
            return Err(PairingError::Superseded);
        };

        match created {
            Ok(created) => {
                session.mark_pairing_ready(created);
                let snapshot = session.clone();
                let session_id = snapshot.session_id().map(|id| id.as_str()).unwrap_or_default();
                info!(
                    epoch,
                    session_id,
                    interval = ?self.policy.interval,
                    max_attempts = self.policy.max_attempts,
                    "pairing code ready, polling for confirmation"
                );

                let polling = PollingLoop::new(
                    Arc::downgrade(&self.shared),
                    Arc::clone(&self.gateway),
                    self.policy.interval,
                    epoch,
                );
                state.poll_task = Some(tokio::spawn(polling.run()));
                self.shared.publish(&state);
                Ok(snapshot)
            }
            Err(e) => {
                let err = PairingError::SessionCreation(e);
                warn!(epoch, error = %err, "pairing session creation failed");
                session.fail(err.to_string());
                self.shared.publish(&state);
                Err(err)
            }
        }
    }

    /// Discards the current attempt and starts a fresh one.
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionController::start_session`].
    pub async fn retry(&self) -> Result<ConnectionSession, PairingError> {
        info!("retrying WhatsApp pairing");
        self.start_session().await
    }

    /// Cancels the polling loop and discards the session.
    ///
    /// Idempotent.  The polling task is aborted before this returns, so no
    /// further gateway calls are made for the discarded session.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.session.is_none() && state.poll_task.is_none() {
            return;
        }
        let epoch = state.reset(None);
        self.shared.publish(&state);
        info!(epoch, "pairing session closed");
    }

    /// Current session, or `None` when no dialog is open.
    pub fn snapshot(&self) -> Option<ConnectionSession> {
        self.shared.lock().session.clone()
    }

    /// Change feed of session snapshots for the presentation layer.
    pub fn subscribe(&self) -> watch::Receiver<Option<ConnectionSession>> {
        self.shared.snapshots.subscribe()
    }

    /// `true` while a polling task is registered for the current session.
    pub fn is_polling(&self) -> bool {
        self.shared
            .lock()
            .poll_task
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Resolves once the current session is terminal, returning it.
    ///
    /// Returns `None` if no session is open, or if it is closed before
    /// reaching a terminal state.
    pub async fn wait_for_terminal(&self) -> Option<ConnectionSession> {
        let mut rx = self.subscribe();
        // The `watch::Ref` borrows `rx`; clone out of it before `rx` drops.
        let terminal = rx
            .wait_for(|s| s.as_ref().map_or(true, ConnectionSession::is_terminal))
            .await
            .ok()
            .and_then(|snapshot| Option::clone(&snapshot));
        terminal
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
