use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Search configuration.
///
/// Loaded from an optional TOML file, then overridden by `FACEFIND_*`
/// environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Platforms queried by image search.
    pub image_search_sources: Vec<String>,
    /// Platforms queried by name search.
    pub name_search_sources: Vec<String>,
    /// Per-source result cap.
    pub max_results_per_source: usize,
    /// Concurrent adapter calls per search.
    pub max_concurrency: usize,
    /// Timeout for a single adapter call.
    pub source_timeout_secs: u64,
    /// Overall deadline for one search.
    pub search_deadline_secs: u64,
    /// Timeout for one thumbnail download.
    pub fetch_timeout_secs: u64,
    /// Candidates examined per requested result.
    pub overfetch_factor: usize,
    /// Thumbnail downloads in flight per source.
    pub fetch_concurrency: usize,
    /// Directory holding the ONNX face models.
    pub model_dir: PathBuf,
    /// Platform name → candidate catalog file.
    pub catalogs: BTreeMap<String, PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            image_search_sources: ["facebook", "google", "instagram", "twitter"]
                .map(String::from)
                .to_vec(),
            name_search_sources: ["facebook", "instagram", "twitter"].map(String::from).to_vec(),
            max_results_per_source: 10,
            max_concurrency: 5,
            source_timeout_secs: 60,
            search_deadline_secs: 180,
            fetch_timeout_secs: 5,
            overfetch_factor: facefind_sources::DEFAULT_OVERFETCH_FACTOR,
            fetch_concurrency: facefind_sources::DEFAULT_FETCH_CONCURRENCY,
            model_dir: facefind_core::default_model_dir(),
            catalogs: BTreeMap::new(),
        }
    }
}

impl SearchConfig {
    /// Load from `path` (or `$FACEFIND_CONFIG`), apply environment overrides, validate.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACEFIND_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `FACEFIND_*` overrides from `lookup`. Unparseable values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let list = |key: &str| {
            lookup(key).map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>()
            })
        };
        let num = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        if let Some(v) = list("FACEFIND_IMAGE_SOURCES") {
            self.image_search_sources = v;
        }
        if let Some(v) = list("FACEFIND_NAME_SOURCES") {
            self.name_search_sources = v;
        }
        if let Some(v) = num("FACEFIND_MAX_RESULTS") {
            self.max_results_per_source = v as usize;
        }
        if let Some(v) = num("FACEFIND_MAX_CONCURRENCY") {
            self.max_concurrency = v as usize;
        }
        if let Some(v) = num("FACEFIND_SOURCE_TIMEOUT_SECS") {
            self.source_timeout_secs = v;
        }
        if let Some(v) = num("FACEFIND_SEARCH_DEADLINE_SECS") {
            self.search_deadline_secs = v;
        }
        if let Some(v) = num("FACEFIND_FETCH_TIMEOUT_SECS") {
            self.fetch_timeout_secs = v;
        }
        if let Some(v) = num("FACEFIND_FETCH_CONCURRENCY") {
            self.fetch_concurrency = v as usize;
        }
        if let Some(v) = lookup("FACEFIND_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = |key: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid {
                    key,
                    reason: "must be greater than zero".into(),
                })
            } else {
                Ok(())
            }
        };
        positive("max_results_per_source", self.max_results_per_source as u64)?;
        positive("max_concurrency", self.max_concurrency as u64)?;
        positive("source_timeout_secs", self.source_timeout_secs)?;
        positive("search_deadline_secs", self.search_deadline_secs)?;
        positive("fetch_timeout_secs", self.fetch_timeout_secs)?;
        positive("overfetch_factor", self.overfetch_factor as u64)?;
        positive("fetch_concurrency", self.fetch_concurrency as u64)?;

        // Worst case: every download in every wave runs to its timeout.
        let downloads = self.max_results_per_source.saturating_mul(self.overfetch_factor);
        let waves = downloads.div_ceil(self.fetch_concurrency) as u64;
        let worst_secs = waves.saturating_mul(self.fetch_timeout_secs);
        if worst_secs > self.source_timeout_secs {
            return Err(ConfigError::Invalid {
                key: "fetch_concurrency",
                reason: format!(
                    "{downloads} thumbnail downloads at {} at a time may take {worst_secs}s, \
                     longer than source_timeout_secs = {}",
                    self.fetch_concurrency, self.source_timeout_secs
                ),
            });
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}
