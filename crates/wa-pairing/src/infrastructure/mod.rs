//! Infrastructure layer for the pairing application.
//!
//! Contains the I/O-facing adapters: the WhatsApp gateway clients and the
//! file-system storage for configuration and pairing images.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `wa_pairing_core`, but MUST NOT be imported by the `application` layer.

pub mod gateway;
pub mod storage;
