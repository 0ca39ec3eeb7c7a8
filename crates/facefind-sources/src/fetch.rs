//! Candidate thumbnail downloads.

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Default per-download timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Bodies above this are not avatars; refuse to buffer them.
pub const MAX_THUMBNAIL_BYTES: usize = 10 * 1024 * 1024;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("body exceeds {0} bytes")]
    TooLarge(usize),
}

/// Raw result of a thumbnail download, handed to the image validator as-is.
#[derive(Debug, Clone)]
pub struct ThumbnailResponse {
    pub status: u16,
    pub content_type: String,
    pub body: Vec<u8>,
}

#[async_trait]
pub trait ThumbnailFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<ThumbnailResponse, FetchError>;
}

/// Thumbnail fetcher over HTTP(S).
#[derive(Clone)]
pub struct HttpThumbnailFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpThumbnailFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            max_bytes: MAX_THUMBNAIL_BYTES,
        })
    }

    /// Override the body size cap.
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl ThumbnailFetcher for HttpThumbnailFetcher {
    async fn fetch(&self, url: &str) -> Result<ThumbnailResponse, FetchError> {
        let start = Instant::now();
        let mut response = self.client.get(url).send().await?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        if response
            .content_length()
            .is_some_and(|len| len > self.max_bytes as u64)
        {
            return Err(FetchError::TooLarge(self.max_bytes));
        }

        // Chunked bodies carry no length up front; stop reading at the cap.
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                tracing::debug!(url, read = body.len(), "thumbnail body over cap, abandoning");
                return Err(FetchError::TooLarge(self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }

        tracing::debug!(
            url,
            status,
            content_type = %content_type,
            bytes = body.len(),
            latency_ms = start.elapsed().as_millis() as u64,
            "fetched thumbnail"
        );

        Ok(ThumbnailResponse {
            status,
            content_type,
            body,
        })
    }
}
