//! Search pipeline configuration

use std::time::Duration;
use tutor_ai_embed::ModelVariant;

/// Immutable configuration for the search core, supplied at construction.
///
/// There is no mechanism to mutate a live pipeline; construct a new one to
/// change configuration.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Model variant used when a request does not specify one (CLI default)
    pub variant: ModelVariant,
    /// Number of scoring batches allowed in flight at once
    pub worker_pool_size: usize,
    /// Candidates per scoring batch
    pub batch_size: usize,
    /// How long cached results stay fresh
    pub cache_ttl: Duration,
    /// Maximum cached entries before oldest-created eviction kicks in
    pub max_cache_size: usize,
    /// Allow delegating top-k retrieval to a store-native similarity index
    /// when the store reports one for the active variant
    pub native_index: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            variant: ModelVariant::default(),
            worker_pool_size: 4,
            batch_size: 32,
            cache_ttl: Duration::from_secs(3600),
            max_cache_size: 100,
            native_index: true,
        }
    }
}

impl SearchConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_max_cache_size(mut self, max: usize) -> Self {
        self.max_cache_size = max;
        self
    }

    pub fn with_native_index(mut self, enabled: bool) -> Self {
        self.native_index = enabled;
        self
    }
}
