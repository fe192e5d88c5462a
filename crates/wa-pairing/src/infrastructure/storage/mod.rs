//! Storage infrastructure: configuration file and pairing image output.
//!
//! - `config` reads and writes the TOML configuration in the platform
//!   config directory, falling back to defaults on first run.
//! - `qr_file` writes the pairing image handed out by the gateway to disk
//!   so it can be opened in an image viewer and scanned.

pub mod config;
pub mod qr_file;
