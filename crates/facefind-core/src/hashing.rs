//! 64-bit perceptual hashing, used as the fallback similarity signal.
//!
//! The hash is the classic DCT pHash: the image is reduced to grayscale,
//! transformed, and the low-frequency 8×8 coefficients are thresholded
//! against their mean. Two hashes are compared by Hamming distance.

use image::RgbImage;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of bits in a [`PerceptualHash`].
pub const HASH_BITS: u32 = 64;

#[derive(Error, Debug)]
pub enum HashError {
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("invalid hash string: {0}")]
    Parse(String),
}

/// A 64-bit perceptual hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    /// Hamming distance in [0, 64].
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for PerceptualHash {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str_radix(s.trim(), 16)
            .map(PerceptualHash)
            .map_err(|e| HashError::Parse(format!("{s:?}: {e}")))
    }
}

/// Map a Hamming distance to a similarity in [0, 1]: `1 - distance / 64`.
///
/// Distances above 64 saturate at 0.0.
pub fn to_similarity(distance: u32) -> f32 {
    1.0 - distance.min(HASH_BITS) as f32 / HASH_BITS as f32
}

/// DCT perceptual hasher.
pub struct PerceptualHasher {
    hasher: Hasher,
}

impl PerceptualHasher {
    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_size(8, 8)
            .hash_alg(HashAlg::Mean)
            .preproc_dct()
            .to_hasher();
        Self { hasher }
    }

    /// Hash a decoded RGB image. Infallible once the image is decoded.
    pub fn hash(&self, image: &RgbImage) -> PerceptualHash {
        let hash = self.hasher.hash_image(image);
        let mut word = [0u8; 8];
        for (dst, src) in word.iter_mut().zip(hash.as_bytes()) {
            *dst = *src;
        }
        PerceptualHash(u64::from_be_bytes(word))
    }

    /// Decode raw bytes and hash them.
    pub fn hash_bytes(&self, bytes: &[u8]) -> Result<PerceptualHash, HashError> {
        let image = crate::validator::decode_rgb(bytes)?;
        Ok(self.hash(&image))
    }
}

impl Default for PerceptualHasher {
    fn default() -> Self {
        Self::new()
    }
}
