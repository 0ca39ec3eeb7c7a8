use async_trait::async_trait;
use facefind_core::hashing::HashError;
use facefind_core::{
    validator, CandidateRecord, Embedding, FaceEmbedder, PerceptualHash, PerceptualHasher,
    ScoredCandidate, Source,
};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("platform unreachable: {0}")]
    Unreachable(String),
    #[error("scraping blocked: {0}")]
    Blocked(String),
    #[error("login required and unavailable")]
    LoginRequired,
    #[error("source not configured: {0}")]
    NotConfigured(String),
    #[error("catalog io: {0}")]
    Io(#[from] std::io::Error),
    #[error("catalog parse: {0}")]
    Catalog(#[from] serde_json::Error),
}

/// A query image with its derived signals, computed once per search and
/// shared read-only by every adapter.
#[derive(Debug, Clone)]
pub struct ImageQuery {
    pub bytes: Arc<[u8]>,
    /// First detected face, or `None` when no face was found.
    pub embedding: Option<Embedding>,
    pub hash: PerceptualHash,
}

impl ImageQuery {
    /// Decode the query once and derive its canonical embedding and hash.
    ///
    /// Fails only when the bytes are not a decodable image.
    pub fn derive(bytes: impl Into<Arc<[u8]>>, embedder: &dyn FaceEmbedder) -> Result<Self, HashError> {
        let bytes = bytes.into();
        let image = validator::decode_rgb(&bytes)?;
        let hash = PerceptualHasher::new().hash(&image);
        let embedding = embedder.first_face(&image);
        Ok(Self {
            bytes,
            embedding,
            hash,
        })
    }

    pub fn has_face(&self) -> bool {
        self.embedding.is_some()
    }
}

/// Search capabilities of one platform.
///
/// Errors mean "this source contributed nothing"; the aggregator logs them
/// and carries on with the other sources.
#[async_trait]
pub trait SourceSearchAdapter: Send + Sync {
    fn source(&self) -> Source;

    /// Candidates scored against the query, sorted descending and truncated
    /// to `max_results`.
    async fn reverse_image_search(
        &self,
        query: &ImageQuery,
        max_results: usize,
    ) -> Result<Vec<ScoredCandidate>, SourceError>;

    /// Profiles matching a name, unscored, truncated to `max_results`.
    async fn name_search(
        &self,
        name: &str,
        max_results: usize,
    ) -> Result<Vec<CandidateRecord>, SourceError>;
}
