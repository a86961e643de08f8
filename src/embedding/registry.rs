//! Process-scoped embedder registry
//!
//! Embedding clients are expensive to construct (model downloads, session
//! setup), so they are cached. The cache is an explicit value handed to
//! whoever builds a vector index, keyed by [`EmbedderKey`]
//! (provider + model + parameters), so there is no hidden global state.

use super::{EmbeddingError, EmbeddingProvider, FastEmbedProvider, HashingProvider};
use crate::config::EmbeddingConfig;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// Cache key for an embedding client
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmbedderKey {
    pub provider: String,
    pub model: String,
    pub params: BTreeMap<String, String>,
}

impl EmbedderKey {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn from_config(config: &EmbeddingConfig) -> Self {
        let mut key = Self::new(&config.provider, &config.model)
            .with_param("dimension", config.dimension);
        if let Some(dir) = &config.cache_dir {
            key = key.with_param("cache_dir", dir.display());
        }
        key
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

type Factory =
    Box<dyn Fn(&EmbedderKey) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> + Send + Sync>;

pub struct EmbedderRegistry {
    factories: HashMap<String, Factory>,
    cache: Mutex<HashMap<EmbedderKey, Arc<dyn EmbeddingProvider>>>,
}

impl EmbedderRegistry {
    /// Registry with no providers registered
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry with the built-in `fastembed` and `hashing` providers
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        registry.register("fastembed", |key| {
            let cache_dir = key.param("cache_dir").map(Into::into);
            let provider = FastEmbedProvider::new(&key.model, cache_dir)?;
            Ok(Arc::new(provider) as Arc<dyn EmbeddingProvider>)
        });

        registry.register("hashing", |key| {
            let dimension = match key.param("dimension") {
                Some(raw) => raw.parse::<usize>().map_err(|_| {
                    EmbeddingError::InitializationError(format!("Invalid dimension: {}", raw))
                })?,
                None => 384,
            };
            Ok(Arc::new(HashingProvider::new(dimension)?) as Arc<dyn EmbeddingProvider>)
        });

        registry
    }

    pub fn register<F>(&mut self, provider: impl Into<String>, factory: F)
    where
        F: Fn(&EmbedderKey) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(provider.into(), Box::new(factory));
    }

    /// Return the cached client for `key`, constructing it on first use
    pub fn get_or_create(
        &self,
        key: &EmbedderKey,
    ) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        // Held across construction so concurrent callers never build twice
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(provider) = cache.get(key) {
            return Ok(Arc::clone(provider));
        }

        let factory = self
            .factories
            .get(&key.provider)
            .ok_or_else(|| EmbeddingError::UnknownProvider(key.provider.clone()))?;

        tracing::debug!(
            "Creating embedder provider={} model={}",
            key.provider,
            key.model
        );
        let provider = factory(key)?;
        cache.insert(key.clone(), Arc::clone(&provider));

        Ok(provider)
    }

    /// Number of cached clients
    pub fn cached(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn clear(&self) {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl Default for EmbedderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
