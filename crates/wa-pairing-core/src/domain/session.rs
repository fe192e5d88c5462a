//! The pairing session state machine.
//!
//! A [`ConnectionSession`] records everything the presentation layer needs
//! to render one pairing attempt, and enforces the transition rules.
//!
//! # Lifecycle
//!
//! ```text
//!            create ok           status: connected
//! Loading ───────────► PairingReady ───────────────► Connected
//!    │                      │
//!    │ create failed        │ attempt == max_attempts
//!    ▼                      ▼
//!  Error                 Timeout
//! ```
//!
//! Transitions only move forward.  Once a terminal state (`Connected`,
//! `Timeout`, `Error`) is reached every mutating method becomes a no-op and
//! reports that nothing changed; a new session has to be created to retry.
//!
//! The controller owns the session behind a lock and calls
//! [`ConnectionSession::begin_tick`] *before* awaiting the gateway, so the
//! terminal check and the attempt increment happen atomically with respect
//! to `retry` and `close`.

use serde::Serialize;
use tracing::debug;

use crate::domain::pairing_image::PairingImage;
use crate::gateway::{CreatedSession, SessionId, SessionStatus};

/// Message stored in `last_error` when the attempt budget runs out.
pub const TIMEOUT_MESSAGE: &str = "pairing code expired, please retry";

/// Current phase of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Waiting for the gateway to create the session and return the QR code.
    Loading,
    /// QR code available; the polling loop is running.
    PairingReady,
    /// The phone scanned the code.  Terminal.
    Connected,
    /// The attempt budget ran out.  Terminal.
    Timeout,
    /// Session creation failed.  Terminal.
    Error,
}

impl SessionState {
    /// `true` for the three states that end a pairing attempt.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Connected | Self::Timeout | Self::Error)
    }

    /// Position in the forward-only ordering.  All terminal states share
    /// the highest rank, so none of them can follow another.
    fn rank(self) -> u8 {
        match self {
            Self::Loading => 0,
            Self::PairingReady => 1,
            Self::Connected | Self::Timeout | Self::Error => 2,
        }
    }
}

/// What the polling loop must do for the tick it is about to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickDecision {
    /// The session is terminal (or not polling yet); exit the loop.
    Stop,
    /// This tick exhausted the budget; the session is now `Timeout`.
    TimedOut,
    /// Query the gateway for this session.
    Query(SessionId),
}

/// Snapshot-able state of one pairing attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionSession {
    session_id: Option<SessionId>,
    pairing_image: Option<PairingImage>,
    state: SessionState,
    attempt: u32,
    max_attempts: u32,
    last_error: Option<String>,
}

impl ConnectionSession {
    /// Creates a fresh session in `Loading` with all counters at zero.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            session_id: None,
            pairing_image: None,
            state: SessionState::Loading,
            attempt: 0,
            max_attempts,
            last_error: None,
        }
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn pairing_image(&self) -> Option<&PairingImage> {
        self.pairing_image.as_ref()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Ticks left before the session times out.
    pub fn remaining_attempts(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempt)
    }

    /// Records the gateway's pairing artifact and enters `PairingReady`.
    ///
    /// Returns `false` (and changes nothing) unless the session is `Loading`.
    pub fn mark_pairing_ready(&mut self, created: CreatedSession) -> bool {
        if self.state != SessionState::Loading {
            debug!(state = ?self.state, "ignoring pairing artifact outside Loading");
            return false;
        }
        self.session_id = Some(created.session_id);
        self.pairing_image = Some(created.pairing_image);
        self.transition(SessionState::PairingReady)
    }

    /// Moves a non-terminal session to `Error` with `message`.
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(SessionState::Error) {
            return false;
        }
        self.last_error = Some(message.into());
        true
    }

    /// Runs the synchronous half of a polling tick.
    ///
    /// Order matters: the terminal check comes first, then the attempt
    /// increment, then the budget check.  Only when all three pass does the
    /// caller get a session id to query.
    pub fn begin_tick(&mut self) -> TickDecision {
        if self.state != SessionState::PairingReady {
            return TickDecision::Stop;
        }
        let Some(session_id) = self.session_id.clone() else {
            return TickDecision::Stop;
        };

        self.attempt += 1;
        if self.attempt >= self.max_attempts {
            self.transition(SessionState::Timeout);
            self.last_error = Some(TIMEOUT_MESSAGE.to_string());
            return TickDecision::TimedOut;
        }
        TickDecision::Query(session_id)
    }

    /// Applies a status query result.  Returns `true` if the session just
    /// became `Connected`.
    pub fn record_status(&mut self, status: SessionStatus) -> bool {
        if !status.connected || self.state != SessionState::PairingReady {
            return false;
        }
        self.transition(SessionState::Connected)
    }

    fn transition(&mut self, next: SessionState) -> bool {
        if self.state.is_terminal() || next.rank() <= self.state.rank() {
            debug!(from = ?self.state, to = ?next, "rejected backward or post-terminal transition");
            return false;
        }
        self.state = next;
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
