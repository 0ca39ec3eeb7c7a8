use crate::config::SearchConfig;
use crate::report::{SearchReport, SourceReport, SourceStatus};
use crate::tracker::{TaskId, TaskTracker};
use chrono::Utc;
use facefind_core::hashing::HashError;
use facefind_core::{sort_by_similarity, CandidateRecord, FaceEmbedder, ScoredCandidate, Source};
use facefind_sources::{ImageQuery, SourceError, SourceRegistry, SourceSearchAdapter};
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinSet};
use tracing::Instrument;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("query image could not be decoded: {0}")]
    InvalidImage(#[from] HashError),
    #[error("name query is empty")]
    EmptyName,
    #[error("query preparation failed: {0}")]
    Internal(String),
}

/// Limits applied to every search.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub max_results_per_source: usize,
    pub max_concurrency: usize,
    pub source_timeout: Duration,
    pub deadline: Duration,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            max_results_per_source: config.max_results_per_source,
            max_concurrency: config.max_concurrency,
            source_timeout: Duration::from_secs(config.source_timeout_secs),
            deadline: Duration::from_secs(config.search_deadline_secs),
        }
    }
}

/// Fans a query out to every configured source concurrently and merges
/// whatever comes back.
///
/// A source that errors, panics or times out contributes nothing and is
/// reported in [`SearchReport::sources`]; it never fails the search.
pub struct SearchAggregator {
    registry: Arc<SourceRegistry>,
    embedder: Arc<dyn FaceEmbedder>,
    image_sources: Vec<String>,
    name_sources: Vec<String>,
    options: SearchOptions,
}

/// Aborts the wrapped task when dropped, so cancelling the outer task
/// also cancels the adapter call it is waiting on.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

impl SearchAggregator {
    pub fn new(
        registry: SourceRegistry,
        embedder: Arc<dyn FaceEmbedder>,
        image_sources: Vec<String>,
        name_sources: Vec<String>,
        options: SearchOptions,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            embedder,
            image_sources,
            name_sources,
            options: SearchOptions {
                max_concurrency: options.max_concurrency.max(1),
                ..options
            },
        }
    }

    pub fn from_config(
        config: &SearchConfig,
        registry: SourceRegistry,
        embedder: Arc<dyn FaceEmbedder>,
    ) -> Self {
        Self::new(
            registry,
            embedder,
            config.image_search_sources.clone(),
            config.name_search_sources.clone(),
            SearchOptions::from(config),
        )
    }

    pub fn options(&self) -> &SearchOptions {
        &self.options
    }

    /// Reverse image search across every image source.
    ///
    /// Results are ranked by similarity, highest first; equal scores keep
    /// the order in which their sources finished.
    pub async fn search_by_image(
        &self,
        image: impl Into<Arc<[u8]>>,
    ) -> Result<SearchReport<ScoredCandidate>, SearchError> {
        let search_id = Uuid::new_v4();
        let span = tracing::info_span!("image_search", search_id = %search_id);
        self.run_image_search(search_id, image.into())
            .instrument(span)
            .await
    }

    async fn run_image_search(
        &self,
        search_id: Uuid,
        bytes: Arc<[u8]>,
    ) -> Result<SearchReport<ScoredCandidate>, SearchError> {
        let started_at = Utc::now();
        let embedder = Arc::clone(&self.embedder);
        let query = tokio::task::spawn_blocking(move || ImageQuery::derive(bytes, embedder.as_ref()))
            .await
            .map_err(|e| SearchError::Internal(e.to_string()))??;

        let face_detected = query.has_face();
        if !face_detected {
            tracing::warn!("no face detected in query image; ranking by perceptual hash only");
        }
        tracing::info!(
            query_hash = %query.hash,
            face_detected,
            sources = self.image_sources.len(),
            "image search started"
        );

        let query = Arc::new(query);
        let max = self.options.max_results_per_source;
        let (mut results, sources) = self
            .fan_out(&self.image_sources, move |adapter| {
                let query = Arc::clone(&query);
                async move {
                    let mut found = adapter.reverse_image_search(&query, max).await?;
                    sort_by_similarity(&mut found);
                    Ok::<_, SourceError>(found)
                }
            })
            .await;
        sort_by_similarity(&mut results);

        tracing::info!(results = results.len(), "image search finished");
        Ok(SearchReport {
            search_id,
            started_at,
            results,
            sources,
            query_face_detected: Some(face_detected),
        })
    }

    /// Profile search by name across every name source.
    ///
    /// Results are unscored and concatenated in source completion order.
    pub async fn search_by_name(
        &self,
        name: &str,
    ) -> Result<SearchReport<CandidateRecord>, SearchError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SearchError::EmptyName);
        }
        let search_id = Uuid::new_v4();
        let span = tracing::info_span!("name_search", search_id = %search_id);
        Ok(self
            .run_name_search(search_id, Arc::from(name))
            .instrument(span)
            .await)
    }

    async fn run_name_search(&self, search_id: Uuid, name: Arc<str>) -> SearchReport<CandidateRecord> {
        let started_at = Utc::now();
        tracing::info!(sources = self.name_sources.len(), "name search started");
        let max = self.options.max_results_per_source;
        let (results, sources) = self
            .fan_out(&self.name_sources, move |adapter| {
                let name = Arc::clone(&name);
                async move { adapter.name_search(&name, max).await }
            })
            .await;

        tracing::info!(results = results.len(), "name search finished");
        SearchReport {
            search_id,
            started_at,
            results,
            sources,
            query_face_detected: None,
        }
    }

    /// Run `call` against every source in `keys` under the concurrency cap,
    /// per-source timeout and overall deadline.
    ///
    /// Keys naming the same platform are queried once. Results are returned
    /// in completion order, capped per source.
    async fn fan_out<T, F, Fut>(&self, keys: &[String], call: F) -> (Vec<T>, Vec<SourceReport>)
    where
        T: Send + 'static,
        F: Fn(Arc<dyn SourceSearchAdapter>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>, SourceError>> + Send + 'static,
    {
        let tracker = Arc::new(TaskTracker::new());
        let permits = Arc::new(Semaphore::new(self.options.max_concurrency));
        let call = Arc::new(call);
        let max = self.options.max_results_per_source;
        let source_timeout = self.options.source_timeout;
        let mut seen = HashSet::new();
        let mut tasks = JoinSet::new();

        for key in keys {
            let source = Source::from(key.as_str());
            if !seen.insert(source.clone()) {
                tracing::debug!(source = %source, key = %key, "duplicate source key skipped");
                continue;
            }
            if !self.registry.contains(key) {
                tracing::warn!(source = %source, "no adapter registered for platform");
                tracker.unavailable(source, "no adapter registered".into());
                continue;
            }

            let id = tracker.submit(source.clone());
            let key = key.clone();
            let registry = Arc::clone(&self.registry);
            let call = Arc::clone(&call);
            let tracker = Arc::clone(&tracker);
            let permits = Arc::clone(&permits);
            let span = tracing::info_span!("source", source = %source);

            tasks.spawn(
                async move {
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return (id, SourceStatus::Cancelled, Vec::new());
                    };
                    tracker.start(id);

                    // Factories may touch the filesystem.
                    let built = tokio::task::spawn_blocking(move || registry.instantiate(&key)).await;
                    let adapter = match built {
                        Ok(Some(Ok(adapter))) => adapter,
                        Ok(Some(Err(e))) => {
                            tracing::warn!(error = %e, "adapter unavailable");
                            return (id, SourceStatus::Unavailable(e.to_string()), Vec::new());
                        }
                        Ok(None) => {
                            let reason = "no adapter registered".to_string();
                            return (id, SourceStatus::Unavailable(reason), Vec::new());
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "adapter construction panicked");
                            let reason = "adapter construction panicked".to_string();
                            return (id, SourceStatus::Unavailable(reason), Vec::new());
                        }
                    };

                    // Panics stay inside the inner task and surface as a JoinError.
                    let inner = tokio::spawn((*call)(adapter).in_current_span());
                    let _guard = AbortOnDrop(inner.abort_handle());

                    match tokio::time::timeout(source_timeout, inner).await {
                        Ok(Ok(Ok(mut found))) => {
                            found.truncate(max);
                            tracing::debug!(results = found.len(), "source completed");
                            (id, SourceStatus::Completed, found)
                        }
                        Ok(Ok(Err(e))) => {
                            tracing::warn!(error = %e, "source failed");
                            (id, SourceStatus::Failed(e.to_string()), Vec::new())
                        }
                        Ok(Err(e)) if e.is_panic() => {
                            tracing::error!("source adapter panicked");
                            (id, SourceStatus::Failed("adapter panicked".into()), Vec::new())
                        }
                        Ok(Err(_)) => (id, SourceStatus::Cancelled, Vec::new()),
                        Err(_) => {
                            tracing::warn!(timeout_secs = source_timeout.as_secs_f32(), "source timed out");
                            (id, SourceStatus::TimedOut, Vec::new())
                        }
                    }
                }
                .instrument(span),
            );
        }

        // Outcomes are recorded only once collected, so a report never
        // claims results that did not make it into the merge.
        let deadline = tokio::time::Instant::now() + self.options.deadline;
        let mut merged = Vec::new();
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(joined)) => collect(&tracker, &mut merged, joined),
                Ok(None) => break,
                Err(_) => {
                    while let Some(joined) = tasks.try_join_next() {
                        collect(&tracker, &mut merged, joined);
                    }
                    let outstanding = tracker.finish_outstanding(SourceStatus::TimedOut);
                    tracing::warn!(outstanding, "search deadline reached, cancelling remaining sources");
                    tasks.abort_all();
                    break;
                }
            }
        }
        tracker.finish_outstanding(SourceStatus::Cancelled);

        (merged, tracker.reports())
    }
}

type SourceOutcome<T> = (TaskId, SourceStatus, Vec<T>);

fn collect<T>(
    tracker: &TaskTracker,
    merged: &mut Vec<T>,
    joined: Result<SourceOutcome<T>, tokio::task::JoinError>,
) {
    match joined {
        Ok((id, status, found)) => {
            tracker.finish(id, status, found.len());
            merged.extend(found);
        }
        Err(e) => tracing::error!(error = %e, "source task ended abnormally"),
    }
}
