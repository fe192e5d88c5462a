//! Contract of the WhatsApp gateway consumed by the pairing controller.
//!
//! The controller is agnostic to the transport: anything that can perform the
//! three operations of [`PairingGateway`] asynchronously will do.  The
//! `wa-pairing` crate ships an HTTP implementation and a scripted in-memory
//! implementation for tests.
//!
//! # Testability
//!
//! With the `mock` feature (or inside this crate's own tests) mockall
//! generates `MockPairingGateway` from the trait definition.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::pairing_image::PairingImage;
use crate::error::GatewayError;

/// Identifier the gateway assigns to a pairing session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a successful `create_session` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub session_id: SessionId,
    pub pairing_image: PairingImage,
}

/// Result of a status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    /// `true` once the phone has scanned the code and the account is linked.
    pub connected: bool,
}

/// The remote operations the pairing flow depends on.
///
/// Implementations must be cheap to share (`Arc<dyn PairingGateway>`) because
/// the controller hands a clone to every polling task.
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait PairingGateway: Send + Sync {
    /// Establishes a new pairing session and returns its scannable artifact.
    async fn create_session(&self) -> Result<CreatedSession, GatewayError>;

    /// Idempotent status check for `session_id`.
    async fn session_status(&self, session_id: &SessionId) -> Result<SessionStatus, GatewayError>;

    /// Terminates an already-linked session.
    async fn disconnect_session(&self, session_id: &SessionId) -> Result<(), GatewayError>;
}
