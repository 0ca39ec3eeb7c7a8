//! facefind-core — Face matching primitives.
//!
//! Validates untrusted candidate images, encodes faces with SCRFD + ArcFace
//! via ONNX Runtime, computes DCT perceptual hashes, and resolves one
//! similarity score per candidate with a hash fallback.

pub mod alignment;
pub mod detector;
pub mod encoder;
pub mod hashing;
pub mod recognizer;
pub mod resolver;
pub mod types;
pub mod validator;

pub use encoder::{FaceEmbedder, FaceEncoder};
pub use hashing::{PerceptualHash, PerceptualHasher};
pub use resolver::{resolve, Resolution};
pub use types::{
    sort_by_similarity, BoundingBox, CandidateRecord, Embedding, MatchMethod, ScoredCandidate,
    Source,
};
pub use validator::{validate, ValidationError};

use std::path::PathBuf;

/// Default model directory: `$XDG_DATA_HOME/facefind/models`, falling back to
/// `~/.local/share/facefind/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facefind")
        .join("models")
}
