//! Platform-name → adapter factory lookup.
//!
//! Adapters are instantiated on demand, once per search, so each search
//! owns its adapter (and whatever session it holds) exclusively.

use crate::adapter::{SourceError, SourceSearchAdapter};
use facefind_core::Source;
use std::collections::HashMap;
use std::sync::Arc;

pub type AdapterFactory =
    Arc<dyn Fn() -> Result<Arc<dyn SourceSearchAdapter>, SourceError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct SourceRegistry {
    factories: HashMap<Source, AdapterFactory>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for a platform.
    pub fn register<F>(&mut self, source: Source, factory: F)
    where
        F: Fn() -> Result<Arc<dyn SourceSearchAdapter>, SourceError> + Send + Sync + 'static,
    {
        if self.factories.insert(source.clone(), Arc::new(factory)).is_some() {
            tracing::debug!(source = %source, "replaced adapter factory");
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(&Source::from(key))
    }

    /// Instantiate the adapter for a platform-name key.
    ///
    /// `None` when no factory is registered for the key.
    pub fn instantiate(&self, key: &str) -> Option<Result<Arc<dyn SourceSearchAdapter>, SourceError>> {
        let source = Source::from(key);
        match self.factories.get(&source) {
            Some(factory) => Some(factory()),
            None => {
                tracing::warn!(source = %source, "no adapter registered for platform");
                None
            }
        }
    }

    pub fn sources(&self) -> impl Iterator<Item = &Source> {
        self.factories.keys()
    }
}
