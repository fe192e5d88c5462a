//! Writes the gateway's pairing image to a file.

use std::path::Path;

use anyhow::Context;
use tracing::debug;

use wa_pairing_core::PairingImage;

/// Writes `image` to `path`.
///
/// Data URLs are decoded and written as raw bytes (a real PNG for the usual
/// `data:image/png;base64,...` payload).  Anything else is raw QR text and is
/// written verbatim.
///
/// # Errors
///
/// Returns an error if a data URL cannot be decoded or the file cannot be
/// written.
pub fn write_pairing_image(image: &PairingImage, path: &Path) -> anyhow::Result<()> {
    let bytes = if image.is_data_url() {
        let decoded = image
            .decode_data_url()
            .context("gateway returned an undecodable pairing image")?;
        debug!(mime_type = %decoded.mime_type, len = decoded.bytes.len(), "decoded pairing image");
        decoded.bytes
    } else {
        image.as_str().as_bytes().to_vec()
    };

    std::fs::write(path, bytes)
        .with_context(|| format!("failed to write pairing image to {}", path.display()))
}
