//! Application layer use cases for the pairing flow.
//!
//! # Sub-modules
//!
//! - **`controller`** – [`ConnectionController`]: owns one pairing attempt at
//!   a time (`start_session`, `retry`, `close`) and publishes snapshots.
//!
//! - **`polling`** – The per-session background task that ticks on a fixed
//!   interval until the session is connected, timed out, or superseded.
//!
//! - **`connection_status`** – [`ConnectionStatusService`]: read/disconnect
//!   access for an already-linked session, used by the status panel.

pub mod connection_status;
pub mod controller;
pub mod polling;

pub use connection_status::{ConnectionStatusService, LinkStatus};
pub use controller::ConnectionController;
