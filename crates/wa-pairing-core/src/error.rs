//! Error taxonomy for the pairing flow.
//!
//! Two layers of errors exist:
//!
//! - [`GatewayError`] describes *why a remote call failed* (network down,
//!   HTTP 500, garbage JSON).  It says nothing about what the failure means
//!   for the user.
//! - [`PairingError`] describes *what the failure means for the pairing
//!   attempt*.  The same `GatewayError` is fatal when `create_session` returns
//!   it ([`PairingError::SessionCreation`]) and harmless when a polling tick
//!   returns it ([`PairingError::TransientPoll`]).
//!
//! Only `SessionCreation` and `Timeout` are ever shown to the user.

use thiserror::Error;

/// A failed call to the WhatsApp gateway.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// The request never produced an HTTP response (DNS, refused, timeout).
    #[error("gateway unreachable: {0}")]
    Transport(String),

    /// The gateway answered with a non-success status code.
    #[error("gateway returned HTTP {status}: {message}")]
    Status { status: u16, message: String },

    /// The gateway answered 2xx but the body did not match the contract.
    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

/// Outcome of a pairing attempt that did not end in `connected`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PairingError {
    /// `create_session` failed.  Fatal: the session moves to `error`.
    #[error("could not start a pairing session: {0}")]
    SessionCreation(#[source] GatewayError),

    /// A status query failed during polling.  Logged and swallowed.
    #[error("status check failed, will retry: {0}")]
    TransientPoll(#[source] GatewayError),

    /// The attempt budget ran out before the phone scanned the code.
    #[error("pairing code expired after {attempts} attempts, please retry")]
    Timeout { attempts: u32 },

    /// A newer `retry` or `close` replaced the session this call belonged to.
    #[error("pairing session was superseded by a newer request")]
    Superseded,
}

/// A pairing image that could not be decoded into raw bytes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ImageError {
    /// The payload does not start with `data:`.
    #[error("pairing image is not a data URL")]
    NotDataUrl,

    /// The data URL header is missing the `;base64,` marker.
    #[error("pairing image data URL is not base64 encoded")]
    NotBase64,

    /// The base64 payload is malformed.
    #[error("pairing image payload is not valid base64: {0}")]
    Decode(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_session_creation_exposes_gateway_error_as_source() {
        // Arrange
        let err = PairingError::SessionCreation(GatewayError::Transport("refused".into()));

        // Act
        let source = err.source().map(|s| s.to_string());

        // Assert
        assert_eq!(source.as_deref(), Some("gateway unreachable: refused"));
    }

    #[test]
    fn test_timeout_message_asks_user_to_retry() {
        let err = PairingError::Timeout { attempts: 30 };
        assert_eq!(
            err.to_string(),
            "pairing code expired after 30 attempts, please retry"
        );
    }

    #[test]
    fn test_status_error_message_includes_code() {
        let err = GatewayError::Status {
            status: 503,
            message: "gateway warming up".into(),
        };
        assert_eq!(err.to_string(), "gateway returned HTTP 503: gateway warming up");
    }
}
