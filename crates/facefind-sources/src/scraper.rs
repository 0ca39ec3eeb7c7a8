//! Adapter over a platform scraper.
//!
//! Platform scrapers (browser automation, login flows, DOM selectors) are
//! external collaborators: they only hand back candidate metadata. This
//! adapter turns that metadata into ranked, scored results.

use crate::adapter::{ImageQuery, SourceError, SourceSearchAdapter};
use crate::fetch::ThumbnailFetcher;
use crate::pipeline::{self, DEFAULT_FETCH_CONCURRENCY};
use async_trait::async_trait;
use facefind_core::{CandidateRecord, FaceEmbedder, ScoredCandidate, Source};
use std::sync::Arc;

/// Candidates examined per requested result, to absorb per-candidate drops.
pub const DEFAULT_OVERFETCH_FACTOR: usize = 3;

/// Discovery half of a platform integration.
#[async_trait]
pub trait PlatformScraper: Send + Sync {
    fn source(&self) -> Source;

    /// Candidate profiles for a reverse image lookup, each ideally with a thumbnail URL.
    async fn discover_by_image(
        &self,
        image_bytes: &[u8],
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, SourceError>;

    /// Candidate profiles for a name lookup.
    async fn discover_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, SourceError>;
}

/// [`SourceSearchAdapter`] for any [`PlatformScraper`].
pub struct ScrapingAdapter<S> {
    scraper: S,
    fetcher: Arc<dyn ThumbnailFetcher>,
    embedder: Arc<dyn FaceEmbedder>,
    overfetch_factor: usize,
    fetch_concurrency: usize,
}

impl<S: PlatformScraper> ScrapingAdapter<S> {
    pub fn new(scraper: S, fetcher: Arc<dyn ThumbnailFetcher>, embedder: Arc<dyn FaceEmbedder>) -> Self {
        Self {
            scraper,
            fetcher,
            embedder,
            overfetch_factor: DEFAULT_OVERFETCH_FACTOR,
            fetch_concurrency: DEFAULT_FETCH_CONCURRENCY,
        }
    }

    pub fn with_overfetch_factor(mut self, factor: usize) -> Self {
        self.overfetch_factor = factor.max(1);
        self
    }

    /// Thumbnail downloads in flight at once.
    pub fn with_fetch_concurrency(mut self, concurrency: usize) -> Self {
        self.fetch_concurrency = concurrency.max(1);
        self
    }
}

#[async_trait]
impl<S: PlatformScraper> SourceSearchAdapter for ScrapingAdapter<S> {
    fn source(&self) -> Source {
        self.scraper.source()
    }

    async fn reverse_image_search(
        &self,
        query: &ImageQuery,
        max_results: usize,
    ) -> Result<Vec<ScoredCandidate>, SourceError> {
        let limit = max_results.saturating_mul(self.overfetch_factor);
        let mut candidates = self.scraper.discover_by_image(&query.bytes, limit).await?;
        candidates.truncate(limit);

        tracing::debug!(
            source = %self.scraper.source(),
            discovered = candidates.len(),
            "scoring discovered candidates"
        );

        Ok(pipeline::score_candidates(
            Arc::new(query.clone()),
            candidates,
            Arc::clone(&self.fetcher),
            Arc::clone(&self.embedder),
            max_results,
            self.fetch_concurrency,
        )
        .await)
    }

    async fn name_search(
        &self,
        name: &str,
        max_results: usize,
    ) -> Result<Vec<CandidateRecord>, SourceError> {
        let mut candidates = self.scraper.discover_by_name(name, max_results).await?;
        candidates.truncate(max_results);
        Ok(candidates)
    }
}
