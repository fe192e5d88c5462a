//! wa-pairing library crate.
//!
//! Drives the WhatsApp QR pairing flow against a gateway service.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! CLI / dashboard (renders ConnectionSession snapshots)
//!         ↕
//! [wa-pairing]
//!   ├── application/      ConnectionController, polling loop, status service
//!   └── infrastructure/
//!         ├── gateway/    HTTP gateway (reqwest) + scripted in-memory gateway
//!         └── storage/    TOML configuration file
//!         ↕
//! WhatsApp gateway (REST)
//! ```
//!
//! # Layer rules
//!
//! - `application` depends on `wa-pairing-core` and `tokio` only; it sees the
//!   gateway through the `PairingGateway` trait.
//! - `infrastructure` implements that trait and owns all file and network I/O.

/// Application layer: pairing controller and polling loop.
pub mod application;

/// Infrastructure layer: gateway adapters and configuration storage.
pub mod infrastructure;
