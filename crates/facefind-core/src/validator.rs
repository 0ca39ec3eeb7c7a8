//! Validation of downloaded candidate images.
//!
//! Thumbnails come from untrusted platform CDNs. Error pages, tracking pixels
//! and truncated transfers are rejected here, before any hashing or
//! embedding work is spent on them.

use image::RgbImage;
use thiserror::Error;

/// Bodies smaller than this are tracking pixels or error-page stand-ins.
pub const MIN_THUMBNAIL_BYTES: usize = 1000;

const HTTP_OK: u16 = 200;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("unexpected HTTP status {0}")]
    Http(u16),
    #[error("non-image content type {0:?}")]
    ContentType(String),
    #[error("body too small: {0} bytes (minimum {MIN_THUMBNAIL_BYTES})")]
    TooSmall(usize),
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Decode bytes into an 8-bit RGB raster.
///
/// Alpha is dropped; grayscale and palette images expand to three channels.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Validate a thumbnail download and decode it to RGB.
pub fn validate(
    http_status: u16,
    content_type: &str,
    body: &[u8],
) -> Result<RgbImage, ValidationError> {
    if http_status != HTTP_OK {
        return Err(ValidationError::Http(http_status));
    }

    if !is_image_content_type(content_type) {
        return Err(ValidationError::ContentType(content_type.to_string()));
    }

    if body.len() < MIN_THUMBNAIL_BYTES {
        return Err(ValidationError::TooSmall(body.len()));
    }

    Ok(decode_rgb(body)?)
}

fn is_image_content_type(content_type: &str) -> bool {
    content_type
        .trim_start()
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}
