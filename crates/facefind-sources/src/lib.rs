//! facefind-sources — Per-platform search adapters.
//!
//! Defines the adapter capability set the aggregator fans out to, plus the
//! shared machinery image-capable adapters use to download, validate and
//! score candidate thumbnails.

pub mod adapter;
pub mod catalog;
pub mod fetch;
pub mod pipeline;
pub mod registry;
pub mod scraper;

pub use adapter::{ImageQuery, SourceError, SourceSearchAdapter};
pub use catalog::CatalogScraper;
pub use fetch::{FetchError, HttpThumbnailFetcher, ThumbnailFetcher, ThumbnailResponse};
pub use pipeline::DEFAULT_FETCH_CONCURRENCY;
pub use registry::{AdapterFactory, SourceRegistry};
pub use scraper::{PlatformScraper, ScrapingAdapter, DEFAULT_OVERFETCH_FACTOR};
