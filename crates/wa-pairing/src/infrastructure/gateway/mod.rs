//! Implementations of [`wa_pairing_core::PairingGateway`].
//!
//! # Sub-modules
//!
//! - **`http`** – Talks to the WhatsApp gateway's REST API with `reqwest`.
//!   This is what production builds use.
//!
//! - **`scripted`** – In-memory gateway whose answers are scripted per call.
//!   Integration tests use it to drive the controller deterministically, and
//!   the CLI's `--demo` mode uses it to walk through the flow offline.

pub mod http;
pub mod scripted;

pub use http::{HttpGateway, HttpGatewayError};
pub use scripted::ScriptedGateway;
