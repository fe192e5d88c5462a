//! The scannable artifact returned by the gateway.
//!
//! Gateways return the QR code either as a `data:image/png;base64,...` URL
//! (ready to drop into an `<img>` tag) or as the raw QR text.  The controller
//! treats it as opaque; only the CLI decodes it to write a PNG file.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::error::ImageError;

/// Opaque pairing payload (QR image data URL or QR text).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PairingImage(String);

/// A data URL split into its MIME type and decoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl PairingImage {
    pub fn new(payload: impl Into<String>) -> Self {
        Self(payload.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `true` when the payload is a `data:` URL rather than raw QR text.
    pub fn is_data_url(&self) -> bool {
        self.0.starts_with("data:")
    }

    /// Decodes a `data:<mime>;base64,<payload>` URL.
    ///
    /// # Errors
    ///
    /// Returns [`ImageError::NotDataUrl`] for raw QR text,
    /// [`ImageError::NotBase64`] for percent-encoded data URLs, and
    /// [`ImageError::Decode`] when the payload is not valid base64.
    pub fn decode_data_url(&self) -> Result<DecodedImage, ImageError> {
        let rest = self.0.strip_prefix("data:").ok_or(ImageError::NotDataUrl)?;
        let (header, payload) = rest.split_once(',').ok_or(ImageError::NotBase64)?;
        let mime_type = header
            .strip_suffix(";base64")
            .ok_or(ImageError::NotBase64)?;

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageError::Decode(e.to_string()))?;

        Ok(DecodedImage {
            mime_type: mime_type.to_string(),
            bytes,
        })
    }
}

impl fmt::Display for PairingImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
