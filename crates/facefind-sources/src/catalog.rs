//! Catalog-backed platform scraper.
//!
//! Reads candidate profiles from a JSON file written by an out-of-process
//! scraping run:
//!
//! ```json
//! { "profiles": [
//!     { "url": "https://www.instagram.com/jdoe/", "username": "jdoe",
//!       "display_name": "Jane Doe", "thumbnail_url": "https://cdn.../jdoe.jpg" }
//! ] }
//! ```

use crate::adapter::SourceError;
use crate::scraper::PlatformScraper;
use async_trait::async_trait;
use facefind_core::{CandidateRecord, Source};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
struct CatalogEntry {
    url: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    thumbnail_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    profiles: Vec<CatalogEntry>,
}

pub struct CatalogScraper {
    source: Source,
    path: PathBuf,
    entries: Vec<CatalogEntry>,
}

impl CatalogScraper {
    /// Load the catalog for `source` from `path`.
    pub fn open(source: Source, path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let text = std::fs::read_to_string(&path)?;
        let file: CatalogFile = serde_json::from_str(&text)?;
        tracing::debug!(
            source = %source,
            path = %path.display(),
            profiles = file.profiles.len(),
            "loaded catalog"
        );
        Ok(Self {
            source,
            path,
            entries: file.profiles,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record(&self, entry: &CatalogEntry) -> CandidateRecord {
        CandidateRecord {
            url: entry.url.clone(),
            display_name: entry.display_name.clone(),
            username: entry.username.clone(),
            thumbnail_url: entry.thumbnail_url.clone(),
            source: self.source.clone(),
        }
    }
}

fn matches_name(entry: &CatalogEntry, needle: &str) -> bool {
    [entry.display_name.as_deref(), entry.username.as_deref()]
        .into_iter()
        .flatten()
        .any(|field| field.to_lowercase().contains(needle))
}

#[async_trait]
impl PlatformScraper for CatalogScraper {
    fn source(&self) -> Source {
        self.source.clone()
    }

    async fn discover_by_image(
        &self,
        _image_bytes: &[u8],
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, SourceError> {
        Ok(self
            .entries
            .iter()
            .filter(|e| e.thumbnail_url.is_some())
            .take(limit)
            .map(|e| self.record(e))
            .collect())
    }

    async fn discover_by_name(
        &self,
        name: &str,
        limit: usize,
    ) -> Result<Vec<CandidateRecord>, SourceError> {
        let needle = name.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .entries
            .iter()
            .filter(|e| matches_name(e, &needle))
            .take(limit)
            .map(|e| self.record(e))
            .collect())
    }
}
