//! Domain layer: pure pairing-flow types with no I/O.
//!
//! # What belongs in the domain layer?
//!
//! - The session state machine and its transition rules
//! - The polling policy (interval, attempt budget)
//! - The pairing image payload and its decoding
//!
//! # What does NOT belong here?
//!
//! - Timers, tasks, or channels (that is the controller in `wa-pairing`)
//! - HTTP calls to the gateway
//! - Anything that could block or fail due to external state

pub mod pairing_image;
pub mod policy;
pub mod session;
