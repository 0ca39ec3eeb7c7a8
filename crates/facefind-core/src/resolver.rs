//! Similarity resolution with a fixed precedence.
//!
//! 1. Both sides have a usable face embedding: clamped cosine similarity.
//! 2. Otherwise: perceptual-hash similarity `1 - distance / 64`.
//! 3. No candidate hash either: the candidate is dropped (`None`).
//!
//! A negative cosine is a valid "dissimilar" signal, so it clamps to 0.0
//! rather than triggering the hash fallback.

use crate::hashing::{to_similarity, PerceptualHash};
use crate::types::{Embedding, MatchMethod};

/// Outcome of a resolution: the score and which signal produced it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    Embedding(f32),
    Hash(f32),
}

impl Resolution {
    pub fn score(&self) -> f32 {
        match *self {
            Resolution::Embedding(s) | Resolution::Hash(s) => s,
        }
    }

    pub fn method(&self) -> MatchMethod {
        match self {
            Resolution::Embedding(_) => MatchMethod::Embedding,
            Resolution::Hash(_) => MatchMethod::PerceptualHash,
        }
    }
}

/// Cosine similarity clamped into [0, 1], or `None` if the vectors are not comparable.
pub fn embedding_similarity(query: &Embedding, candidate: &Embedding) -> Option<f32> {
    query.cosine(candidate).map(|cos| cos.clamp(0.0, 1.0))
}

/// Resolve a single similarity score for a candidate.
///
/// Never fails for a candidate that has a hash; returns `None` only when the
/// candidate hash is missing, meaning the candidate must be dropped.
pub fn resolve(
    query_embedding: Option<&Embedding>,
    query_hash: &PerceptualHash,
    candidate_embedding: Option<&Embedding>,
    candidate_hash: Option<&PerceptualHash>,
) -> Option<Resolution> {
    if let (Some(q), Some(c)) = (query_embedding, candidate_embedding) {
        if let Some(score) = embedding_similarity(q, c) {
            return Some(Resolution::Embedding(score));
        }
        tracing::debug!(
            query_dim = q.dim(),
            candidate_dim = c.dim(),
            "embeddings not comparable, using hash fallback"
        );
    }

    let candidate_hash = candidate_hash?;
    let distance = query_hash.distance(candidate_hash);
    Some(Resolution::Hash(to_similarity(distance)))
}
