//! # wa-pairing-core
//!
//! Shared library for the WhatsApp pairing flow containing the session state
//! machine, the polling policy, the gateway contract, and the error taxonomy.
//!
//! It has no dependency on an async runtime, HTTP client, or file system.
//! The `wa-pairing` crate supplies those.
//!
//! # Architecture overview (for beginners)
//!
//! Linking a WhatsApp account to the dashboard works like "WhatsApp Web":
//! the gateway creates a pairing session and hands back a QR code, the user
//! scans it with their phone, and the dashboard keeps asking the gateway
//! "is it linked yet?" until it either is, or the QR code expires.
//!
//! This crate defines the pieces of that flow that do not involve waiting:
//!
//! - **`domain`** – The [`ConnectionSession`] state machine
//!   (`loading → pairing_ready → connected | timeout | error`), the
//!   [`PollingPolicy`] (interval and attempt budget), and the
//!   [`PairingImage`] payload.
//!
//! - **`gateway`** – The [`PairingGateway`] trait: the three remote operations
//!   the controller consumes (create, query, disconnect).
//!
//! - **`error`** – [`GatewayError`] for remote failures and [`PairingError`]
//!   for the user-visible outcomes of a pairing attempt.

pub mod domain;
pub mod error;
pub mod gateway;

// Re-export the most-used types at the crate root so callers can write
// `wa_pairing_core::ConnectionSession` instead of the full module path.
pub use domain::pairing_image::{DecodedImage, PairingImage};
pub use domain::policy::PollingPolicy;
pub use domain::session::{ConnectionSession, SessionState, TickDecision};
pub use error::{GatewayError, ImageError, PairingError};
pub use gateway::{CreatedSession, PairingGateway, SessionId, SessionStatus};

#[cfg(any(test, feature = "mock"))]
pub use gateway::MockPairingGateway;
