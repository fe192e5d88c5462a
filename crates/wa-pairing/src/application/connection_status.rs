//! Status panel use case: inspect or unlink an already-paired session.
//!
//! This is separate from the pairing controller because it deals with a
//! session that finished pairing long ago (its id comes from storage or the
//! command line), not with the live QR flow.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use wa_pairing_core::{GatewayError, PairingGateway, SessionId};

/// Whether a WhatsApp account is currently linked through a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Linked,
    Unlinked,
}

pub struct ConnectionStatusService {
    gateway: Arc<dyn PairingGateway>,
}

impl ConnectionStatusService {
    pub fn new(gateway: Arc<dyn PairingGateway>) -> Self {
        Self { gateway }
    }

    /// Queries the gateway once for `session_id`.
    pub async fn check(&self, session_id: &SessionId) -> Result<LinkStatus, GatewayError> {
        let status = self.gateway.session_status(session_id).await?;
        Ok(if status.connected {
            LinkStatus::Linked
        } else {
            LinkStatus::Unlinked
        })
    }

    /// Terminates the linked session on the gateway.
    pub async fn disconnect(&self, session_id: &SessionId) -> Result<(), GatewayError> {
        match self.gateway.disconnect_session(session_id).await {
            Ok(()) => {
                info!(%session_id, "WhatsApp session disconnected");
                Ok(())
            }
            Err(e) => {
                warn!(%session_id, error = %e, "failed to disconnect WhatsApp session");
                Err(e)
            }
        }
    }
}
