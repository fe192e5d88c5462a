//! Scripted in-memory gateway.
//!
//! Allows tests to decide, call by call, what the gateway answers without a
//! running WhatsApp gateway, and records every call so tests can assert on
//! how the controller used it.
//!
//! # Defaults
//!
//! - `create_session` succeeds with `session-1`, `session-2`, ... unless a
//!   scripted creation result is queued.
//! - `session_status` answers "not connected" unless a status script is set.
//!   The script receives the 1-based call number *for that session*, so a
//!   retried session starts counting from 1 again.
//! - Latency can be injected separately for creation and status calls; the
//!   call is counted when it starts, not when it answers.
//! - `session_status` and `disconnect_session` answer HTTP 404 for ids the
//!   gateway never issued.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use wa_pairing_core::{
    CreatedSession, GatewayError, PairingGateway, PairingImage, SessionId, SessionStatus,
};

/// Status script: `(session id, per-session call number) -> answer`.
type StatusScript = dyn Fn(&SessionId, u32) -> Result<SessionStatus, GatewayError> + Send + Sync;

/// 1×1 transparent PNG handed out as the pairing image.
const PLACEHOLDER_QR: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

#[derive(Default)]
struct ScriptState {
    queued_creations: VecDeque<Result<CreatedSession, GatewayError>>,
    sessions_created: u32,
    issued: Vec<SessionId>,
    status_calls: HashMap<SessionId, u32>,
    disconnected: Vec<SessionId>,
}

/// A [`PairingGateway`] whose answers are scripted by the test.
pub struct ScriptedGateway {
    state: Mutex<ScriptState>,
    status_script: Arc<StatusScript>,
    status_latency: Duration,
    creation_latency: Duration,
}

impl ScriptedGateway {
    /// Creates a gateway that issues sessions freely and never reports a link.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ScriptState::default()),
            status_script: Arc::new(|_, _| Ok(SessionStatus { connected: false })),
            status_latency: Duration::ZERO,
            creation_latency: Duration::ZERO,
        }
    }

    /// Reports the session as linked on its `n`-th status query.
    pub fn connect_on_call(self, n: u32) -> Self {
        self.with_status(move |_, call| Ok(SessionStatus { connected: call >= n }))
    }

    /// Replaces the status script.
    pub fn with_status<F>(mut self, script: F) -> Self
    where
        F: Fn(&SessionId, u32) -> Result<SessionStatus, GatewayError> + Send + Sync + 'static,
    {
        self.status_script = Arc::new(script);
        self
    }

    /// Makes every status query take `latency` before answering.
    pub fn with_status_latency(mut self, latency: Duration) -> Self {
        self.status_latency = latency;
        self
    }

    /// Makes every `create_session` call take `latency` before answering.
    pub fn with_creation_latency(mut self, latency: Duration) -> Self {
        self.creation_latency = latency;
        self
    }

    /// Queues the result of the next `create_session` call.
    pub fn queue_creation(self, result: Result<CreatedSession, GatewayError>) -> Self {
        self.lock().queued_creations.push_back(result);
        self
    }

    /// Number of `create_session` calls so far.
    pub fn sessions_created(&self) -> u32 {
        self.lock().sessions_created
    }

    /// Number of status queries made for `session_id`.
    pub fn status_calls(&self, session_id: &str) -> u32 {
        self.lock()
            .status_calls
            .get(&SessionId::new(session_id))
            .copied()
            .unwrap_or(0)
    }

    /// Number of status queries across all sessions.
    pub fn total_status_calls(&self) -> u32 {
        self.lock().status_calls.values().sum()
    }

    /// Sessions passed to `disconnect_session`, in call order.
    pub fn disconnected(&self) -> Vec<SessionId> {
        self.lock().disconnected.clone()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn not_found(session_id: &SessionId) -> GatewayError {
        GatewayError::Status {
            status: 404,
            message: format!("session {session_id} not found"),
        }
    }
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PairingGateway for ScriptedGateway {
    async fn create_session(&self) -> Result<CreatedSession, GatewayError> {
        let result = {
            let mut state = self.lock();
            state.sessions_created += 1;
            let number = state.sessions_created;
            let result = state.queued_creations.pop_front().unwrap_or_else(|| {
                Ok(CreatedSession {
                    session_id: SessionId::new(format!("session-{number}")),
                    pairing_image: PairingImage::new(PLACEHOLDER_QR),
                })
            });
            if let Ok(created) = &result {
                state.issued.push(created.session_id.clone());
            }
            result
        };

        if !self.creation_latency.is_zero() {
            tokio::time::sleep(self.creation_latency).await;
        }
        result
    }

    async fn session_status(&self, session_id: &SessionId) -> Result<SessionStatus, GatewayError> {
        let call = {
            let mut state = self.lock();
            if !state.issued.contains(session_id) {
                return Err(Self::not_found(session_id));
            }
            let calls = state.status_calls.entry(session_id.clone()).or_insert(0);
            *calls += 1;
            *calls
        };

        if !self.status_latency.is_zero() {
            tokio::time::sleep(self.status_latency).await;
        }
        (self.status_script)(session_id, call)
    }

    async fn disconnect_session(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        let mut state = self.lock();
        if !state.issued.contains(session_id) {
            return Err(Self::not_found(session_id));
        }
        state.disconnected.push(session_id.clone());
        Ok(())
    }
}
