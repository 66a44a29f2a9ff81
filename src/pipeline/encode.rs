//! Image encoding: file bytes → base64 data URI for the chat request.
//!
//! OpenAI-compatible vision endpoints accept images as `data:` URIs inside
//! the JSON request body. Bundle images are sent as-is; the MIME type is
//! taken from the file extension.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;
use std::path::Path;
use tracing::debug;

/// Extensions accepted as figure images (case-insensitive).
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"];

/// True when the path has one of [`IMAGE_EXTENSIONS`].
pub fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| known.eq_ignore_ascii_case(e))
        })
        .unwrap_or(false)
}

/// MIME type for an image path. Unknown extensions fall back to `image/png`.
pub fn mime_type(path: &Path) -> &'static str {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type())
        .unwrap_or("image/png")
}

/// Wrap raw image bytes as a `data:<mime>;base64,…` URI.
pub fn to_data_uri(bytes: &[u8], mime: &str) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    format!("data:{mime};base64,{b64}")
}
