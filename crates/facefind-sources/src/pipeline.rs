//! Per-candidate scoring shared by every image-capable adapter.
//!
//! download → validate → embed → hash → resolve. Any per-candidate failure
//! drops that candidate and leaves the rest of the batch untouched.

use crate::adapter::ImageQuery;
use crate::fetch::{ThumbnailFetcher, ThumbnailResponse};
use facefind_core::{
    resolve, sort_by_similarity, validate, CandidateRecord, FaceEmbedder, PerceptualHasher,
    ScoredCandidate,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::Instrument;

/// Thumbnail downloads in flight per adapter call.
pub const DEFAULT_FETCH_CONCURRENCY: usize = 8;

/// Score one candidate against the query from its downloaded thumbnail.
///
/// CPU-bound; call from a blocking context. Returns `None` when the
/// thumbnail fails validation.
pub fn score_thumbnail(
    query: &ImageQuery,
    candidate: CandidateRecord,
    response: &ThumbnailResponse,
    embedder: &dyn FaceEmbedder,
) -> Option<ScoredCandidate> {
    let image = match validate(response.status, &response.content_type, &response.body) {
        Ok(image) => image,
        Err(e) => {
            tracing::debug!(url = %candidate.url, error = %e, "candidate thumbnail rejected");
            return None;
        }
    };

    // A candidate face only matters when the query has one to compare against.
    let candidate_embedding = match &query.embedding {
        Some(_) => embedder.first_face(&image),
        None => None,
    };
    let candidate_hash = PerceptualHasher::new().hash(&image);

    let resolution = resolve(
        query.embedding.as_ref(),
        &query.hash,
        candidate_embedding.as_ref(),
        Some(&candidate_hash),
    )?;

    Some(ScoredCandidate {
        candidate,
        similarity: resolution.score(),
        method: resolution.method(),
    })
}

/// Download, score, rank and truncate a batch of discovered candidates.
///
/// Up to `fetch_concurrency` thumbnails download at once. Equal scores keep
/// discovery order regardless of which download finished first.
pub async fn score_candidates(
    query: Arc<ImageQuery>,
    candidates: Vec<CandidateRecord>,
    fetcher: Arc<dyn ThumbnailFetcher>,
    embedder: Arc<dyn FaceEmbedder>,
    max_results: usize,
    fetch_concurrency: usize,
) -> Vec<ScoredCandidate> {
    let examined = candidates.len();
    let permits = Arc::new(Semaphore::new(fetch_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for (index, candidate) in candidates.into_iter().enumerate() {
        let Some(thumbnail_url) = candidate.thumbnail_url.clone() else {
            tracing::debug!(url = %candidate.url, "candidate has no thumbnail");
            continue;
        };

        let query = Arc::clone(&query);
        let fetcher = Arc::clone(&fetcher);
        let embedder = Arc::clone(&embedder);
        let permits = Arc::clone(&permits);
        tasks.spawn(
            async move {
                let Ok(permit) = permits.acquire_owned().await else {
                    return None;
                };
                let response = match fetcher.fetch(&thumbnail_url).await {
                    Ok(response) => response,
                    Err(e) => {
                        tracing::debug!(url = %thumbnail_url, error = %e, "thumbnail download failed");
                        return None;
                    }
                };
                drop(permit);

                let scored = tokio::task::spawn_blocking(move || {
                    score_thumbnail(&query, candidate, &response, embedder.as_ref())
                })
                .await;
                match scored {
                    Ok(result) => result.map(|hit| (index, hit)),
                    Err(e) => {
                        tracing::warn!(url = %thumbnail_url, error = %e, "candidate scoring panicked");
                        None
                    }
                }
            }
            .in_current_span(),
        );
    }

    let mut arrived = Vec::with_capacity(examined);
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Some(hit)) => arrived.push(hit),
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "candidate task ended abnormally"),
        }
    }
    arrived.sort_by_key(|(index, _)| *index);

    let mut scored: Vec<ScoredCandidate> = arrived.into_iter().map(|(_, hit)| hit).collect();
    sort_by_similarity(&mut scored);
    scored.truncate(max_results);

    tracing::debug!(examined, kept = scored.len(), "scored candidates");
    scored
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use facefind_core::Embedding;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::collections::{HashMap, HashSet};
    use std::io::Cursor;
    use std::time::Duration;

    use crate::fetch::FetchError;

    /// Deterministic noise image, PNG-encoded; large enough to pass validation.
    pub fn noise_png(seed: u32, width: u32, height: u32) -> Vec<u8> {
        let mut state = seed | 1;
        let img = RgbImage::from_fn(width, height, |_, _| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let [r, g, b, _] = state.to_le_bytes();
            Rgb([r, g, b])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    /// Embedder that reads a "face" from the top-left pixel: red > 0 means a
    /// face whose embedding is `[r, g]`.
    pub struct PixelEmbedder;

    impl FaceEmbedder for PixelEmbedder {
        fn encode_image(&self, image: &RgbImage) -> Vec<Embedding> {
            let p = image.get_pixel(0, 0).0;
            if p[0] == 0 {
                Vec::new()
            } else {
                vec![Embedding::new(vec![p[0] as f32, p[1] as f32])]
            }
        }
    }

    /// PNG whose top-left pixel encodes a face `[r, g]` (r = 0 → no face).
    pub fn face_png(seed: u32, r: u8, g: u8) -> Vec<u8> {
        let bytes = noise_png(seed, 48, 48);
        let mut img = image::load_from_memory(&bytes).unwrap().to_rgb8();
        img.put_pixel(0, 0, Rgb([r, g, 0]));
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img).write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[derive(Default)]
    pub struct MapFetcher {
        pub responses: HashMap<String, ThumbnailResponse>,
        pub failures: HashSet<String>,
        pub delays: HashMap<String, Duration>,
    }

    impl MapFetcher {
        pub fn with_image(mut self, url: &str, body: Vec<u8>) -> Self {
            self.responses.insert(
                url.to_string(),
                ThumbnailResponse {
                    status: 200,
                    content_type: "image/png".into(),
                    body,
                },
            );
            self
        }

        pub fn with_response(mut self, url: &str, status: u16, content_type: &str, body: Vec<u8>) -> Self {
            self.responses.insert(
                url.to_string(),
                ThumbnailResponse {
                    status,
                    content_type: content_type.into(),
                    body,
                },
            );
            self
        }

        /// Make `url` fail at the transport level.
        pub fn with_failure(mut self, url: &str) -> Self {
            self.failures.insert(url.to_string());
            self
        }

        pub fn with_delay(mut self, url: &str, delay: Duration) -> Self {
            self.delays.insert(url.to_string(), delay);
            self
        }
    }

    #[async_trait]
    impl ThumbnailFetcher for MapFetcher {
        async fn fetch(&self, url: &str) -> Result<ThumbnailResponse, FetchError> {
            if let Some(delay) = self.delays.get(url) {
                tokio::time::sleep(*delay).await;
            }
            if self.failures.contains(url) {
                return Err(FetchError::TooLarge(0));
            }
            Ok(self.responses.get(url).cloned().unwrap_or(ThumbnailResponse {
                status: 404,
                content_type: "text/html".into(),
                body: b"not found".to_vec(),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use facefind_core::{MatchMethod, Source};
    use std::time::{Duration, Instant};

    fn candidate(n: u32) -> CandidateRecord {
        CandidateRecord::new(format!("https://example.com/p/{n}"), Source::Instagram)
            .with_thumbnail(format!("https://cdn.example.com/{n}.png"))
    }

    fn query(bytes: Vec<u8>) -> Arc<ImageQuery> {
        Arc::new(ImageQuery::derive(bytes, &PixelEmbedder).unwrap())
    }

    #[tokio::test]
    async fn test_scores_by_embedding_when_both_faces_present() {
        let q = query(face_png(1, 10, 0));
        let fetcher = MapFetcher::default()
            .with_image("https://cdn.example.com/1.png", face_png(2, 10, 0))
            .with_image("https://cdn.example.com/2.png", face_png(3, 10, 10));

        let results = score_candidates(
            q,
            vec![candidate(2), candidate(1)],
            Arc::new(fetcher),
            Arc::new(PixelEmbedder),
            10,
            DEFAULT_FETCH_CONCURRENCY,
        )
        .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].candidate.url, "https://example.com/p/1");
        assert_eq!(results[0].similarity, 1.0);
        assert_eq!(results[0].method, MatchMethod::Embedding);
        assert!((results[1].similarity - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_faceless_query_uses_hash_for_every_candidate() {
        let q = query(face_png(1, 0, 0));
        assert!(!q.has_face());
        let fetcher = MapFetcher::default()
            .with_image("https://cdn.example.com/1.png", face_png(1, 0, 0))
            .with_image("https://cdn.example.com/2.png", face_png(7, 10, 0));

        let results = score_candidates(
            q,
            vec![candidate(1), candidate(2)],
            Arc::new(fetcher),
            Arc::new(PixelEmbedder),
            10,
            DEFAULT_FETCH_CONCURRENCY,
        )
        .await;

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.method == MatchMethod::PerceptualHash));
        // Identical image hashes identically.
        assert_eq!(results[0].candidate.url, "https://example.com/p/1");
        assert_eq!(results[0].similarity, 1.0);
    }

    #[tokio::test]
    async fn test_faceless_candidate_falls_back_to_hash() {
        let q = query(face_png(1, 10, 0));
        let fetcher =
            MapFetcher::default().with_image("https://cdn.example.com/1.png", face_png(1, 0, 0));

        let results =
            score_candidates(q, vec![candidate(1)], Arc::new(fetcher), Arc::new(PixelEmbedder), 10, 4).await;

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].method, MatchMethod::PerceptualHash);
    }

    #[tokio::test]
    async fn test_bad_thumbnails_are_dropped_not_zeroed() {
        let q = query(face_png(1, 10, 0));
        let fetcher = MapFetcher::default()
            .with_image("https://cdn.example.com/1.png", face_png(2, 10, 0))
            .with_response("https://cdn.example.com/2.png", 200, "text/html", face_png(3, 10, 0))
            .with_response("https://cdn.example.com/3.png", 200, "image/gif", vec![0x47; 64]);
        // 4.png missing → 404

        let mut no_thumb = candidate(5);
        no_thumb.thumbnail_url = None;

        let results = score_candidates(
            q,
            vec![candidate(1), candidate(2), candidate(3), candidate(4), no_thumb],
            Arc::new(fetcher),
            Arc::new(PixelEmbedder),
            10,
            DEFAULT_FETCH_CONCURRENCY,
        )
        .await;

        let urls: Vec<_> = results.iter().map(|r| r.candidate.url.as_str()).collect();
        assert_eq!(urls, ["https://example.com/p/1"]);
    }

    #[tokio::test]
    async fn test_truncates_after_sorting() {
        let q = query(face_png(1, 10, 0));
        let mut fetcher = MapFetcher::default();
        let mut candidates = Vec::new();
        for n in 1..=6u32 {
            fetcher = fetcher.with_image(
                &format!("https://cdn.example.com/{n}.png"),
                face_png(n + 10, 10, (n * 10) as u8),
            );
            candidates.push(candidate(n));
        }

        let results =
            score_candidates(q, candidates, Arc::new(fetcher), Arc::new(PixelEmbedder), 3, 2).await;

        let urls: Vec<_> = results.iter().map(|r| r.candidate.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://example.com/p/1", "https://example.com/p/2", "https://example.com/p/3"]
        );
    }

    #[tokio::test]
    async fn test_transport_errors_drop_only_that_candidate() {
        let q = query(face_png(1, 10, 0));
        let fetcher = MapFetcher::default()
            .with_image("https://cdn.example.com/1.png", face_png(2, 10, 0))
            .with_image("https://cdn.example.com/2.png", face_png(3, 10, 5))
            .with_failure("https://cdn.example.com/2.png")
            .with_image("https://cdn.example.com/3.png", face_png(4, 10, 10));

        let results = score_candidates(
            q,
            vec![candidate(1), candidate(2), candidate(3)],
            Arc::new(fetcher),
            Arc::new(PixelEmbedder),
            10,
            DEFAULT_FETCH_CONCURRENCY,
        )
        .await;

        let urls: Vec<_> = results.iter().map(|r| r.candidate.url.as_str()).collect();
        assert_eq!(urls, ["https://example.com/p/1", "https://example.com/p/3"]);
    }

    #[tokio::test]
    async fn test_downloads_overlap() {
        let q = query(face_png(1, 10, 0));
        let mut fetcher = MapFetcher::default();
        let mut candidates = Vec::new();
        for n in 1..=6u32 {
            let url = format!("https://cdn.example.com/{n}.png");
            fetcher = fetcher
                .with_image(&url, face_png(n + 20, 10, n as u8))
                .with_delay(&url, Duration::from_millis(150));
            candidates.push(candidate(n));
        }

        let started = Instant::now();
        let results =
            score_candidates(q, candidates, Arc::new(fetcher), Arc::new(PixelEmbedder), 10, 6).await;

        assert_eq!(results.len(), 6);
        // One at a time would take 900 ms.
        assert!(started.elapsed() < Duration::from_millis(600));
    }

    #[tokio::test]
    async fn test_ties_keep_discovery_order() {
        let q = query(face_png(1, 10, 0));
        // Later candidates finish downloading first.
        let fetcher = MapFetcher::default()
            .with_image("https://cdn.example.com/1.png", face_png(5, 10, 0))
            .with_delay("https://cdn.example.com/1.png", Duration::from_millis(200))
            .with_image("https://cdn.example.com/2.png", face_png(6, 10, 0))
            .with_delay("https://cdn.example.com/2.png", Duration::from_millis(100))
            .with_image("https://cdn.example.com/3.png", face_png(7, 10, 0));

        let results = score_candidates(
            q,
            vec![candidate(1), candidate(2), candidate(3)],
            Arc::new(fetcher),
            Arc::new(PixelEmbedder),
            10,
            DEFAULT_FETCH_CONCURRENCY,
        )
        .await;

        let urls: Vec<_> = results.iter().map(|r| r.candidate.url.as_str()).collect();
        assert_eq!(
            urls,
            ["https://example.com/p/1", "https://example.com/p/2", "https://example.com/p/3"]
        );
        assert!(results.iter().all(|r| r.similarity == 1.0));
    }
}
