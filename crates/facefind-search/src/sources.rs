//! Wiring configured catalogs into a [`SourceRegistry`].

use crate::config::SearchConfig;
use facefind_core::{FaceEmbedder, Source};
use facefind_sources::{
    CatalogScraper, FetchError, HttpThumbnailFetcher, ScrapingAdapter, SourceRegistry,
    SourceSearchAdapter, ThumbnailFetcher,
};
use std::sync::Arc;

/// Register one catalog-backed scraping adapter per `[catalogs]` entry.
///
/// Catalog files are opened when a search instantiates the adapter, so a
/// missing or malformed file surfaces as an unavailable source, not a
/// startup failure.
pub fn catalog_registry(
    config: &SearchConfig,
    embedder: Arc<dyn FaceEmbedder>,
) -> Result<SourceRegistry, FetchError> {
    let fetcher: Arc<dyn ThumbnailFetcher> =
        Arc::new(HttpThumbnailFetcher::new(config.fetch_timeout())?);
    let overfetch = config.overfetch_factor;
    let fetch_concurrency = config.fetch_concurrency;
    let mut registry = SourceRegistry::new();

    for (platform, path) in &config.catalogs {
        let source = Source::from(platform.as_str());
        let path = path.clone();
        let fetcher = Arc::clone(&fetcher);
        let embedder = Arc::clone(&embedder);
        tracing::debug!(source = %source, path = %path.display(), "registering catalog source");

        let factory_source = source.clone();
        registry.register(source, move || {
            let scraper = CatalogScraper::open(factory_source.clone(), &path)?;
            let adapter = ScrapingAdapter::new(scraper, Arc::clone(&fetcher), Arc::clone(&embedder))
                .with_overfetch_factor(overfetch)
                .with_fetch_concurrency(fetch_concurrency);
            Ok(Arc::new(adapter) as Arc<dyn SourceSearchAdapter>)
        });
    }

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facefind_core::Embedding;
    use facefind_sources::SourceError;
    use image::RgbImage;
    use std::io::Write;
    use std::path::PathBuf;

    struct NoFaces;

    impl FaceEmbedder for NoFaces {
        fn encode_image(&self, _image: &RgbImage) -> Vec<Embedding> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_catalog_sources_are_searchable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "profiles": [
                {{ "url": "https://instagram.com/jdoe", "display_name": "Jane Doe" }},
                {{ "url": "https://instagram.com/bob", "display_name": "Bob" }}
            ] }}"#
        )
        .unwrap();

        let mut config = SearchConfig::default();
        config
            .catalogs
            .insert("Instagram".into(), file.path().to_path_buf());
        let registry = catalog_registry(&config, Arc::new(NoFaces)).unwrap();

        let adapter = registry.instantiate("instagram").unwrap().unwrap();
        assert_eq!(adapter.source(), Source::Instagram);
        let found = adapter.name_search("jane", 10).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, "https://instagram.com/jdoe");
    }

    #[test]
    fn test_missing_catalog_fails_at_instantiation() {
        let mut config = SearchConfig::default();
        config
            .catalogs
            .insert("twitter".into(), PathBuf::from("/nonexistent/twitter.json"));
        let registry = catalog_registry(&config, Arc::new(NoFaces)).unwrap();

        assert!(registry.contains("twitter"));
        assert!(matches!(registry.instantiate("twitter"), Some(Err(SourceError::Io(_)))));
    }
}
