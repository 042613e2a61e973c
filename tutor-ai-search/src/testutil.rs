//! In-memory doubles for the embedding provider and concept store, shared by
//! the ranking and cache tests.

use crate::concept::{Concept, SourceType};
use crate::error::{Result, SearchError};
use crate::ranking::cosine_similarity;
use crate::store::ConceptStore;
use async_trait::async_trait;
use half::f16;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tutor_ai_embed::{EmbedError, EmbeddingBatch, EmbeddingProvider, ModelVariant};

/// Convert f32 components to an f16 vector.
pub fn vector(components: &[f32]) -> Vec<f16> {
    components.iter().copied().map(f16::from_f32).collect()
}

/// Build a stored concept with an id, a placeholder definition, and an
/// embedding from the given components.
pub fn concept(
    id: i64,
    name: impl Into<String>,
    source_type: SourceType,
    components: &[f32],
) -> Concept {
    let name = name.into();
    let mut concept = Concept::new(name.clone(), format!("definition of {name}"), source_type)
        .with_embedding(vector(components));
    concept.id = Some(id);
    concept
}

/// Embedding provider that returns pre-registered vectors by exact trimmed
/// text, with no model behind it.
pub struct StaticEmbedder {
    vectors: HashMap<String, Vec<f16>>,
    dimension: usize,
}

impl StaticEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
        }
    }

    pub fn with_vector(mut self, text: &str, components: &[f32]) -> Self {
        self.vectors.insert(text.to_string(), vector(components));
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticEmbedder {
    async fn embed_text(
        &self,
        text: &str,
        _variant: ModelVariant,
    ) -> tutor_ai_embed::Result<Vec<f16>> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyText);
        }
        self.vectors
            .get(text.trim())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no registered vector for text: {text}").into())
    }

    async fn embed_texts(
        &self,
        texts: &[String],
        variant: ModelVariant,
    ) -> tutor_ai_embed::Result<EmbeddingBatch> {
        let mut embeddings = Vec::with_capacity(texts.len());
        for text in texts {
            embeddings.push(self.embed_text(text, variant).await?);
        }
        Ok(EmbeddingBatch::new(embeddings))
    }

    fn dimension(&self, _variant: ModelVariant) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "static"
    }
}

/// In-memory [`ConceptStore`] with call counters, optional artificial fetch
/// latency, injectable failures, and a switchable native top-k path.
///
/// Clones share the same underlying state.
#[derive(Clone)]
pub struct MemoryStore {
    concepts: Arc<Mutex<Vec<Concept>>>,
    native: bool,
    fetch_delay: Option<Duration>,
    pub fetch_calls: Arc<AtomicUsize>,
    pub topk_calls: Arc<AtomicUsize>,
    fail_fetch: Arc<AtomicBool>,
    last_variant: Arc<Mutex<Option<ModelVariant>>>,
}

impl MemoryStore {
    pub fn new(concepts: Vec<Concept>) -> Self {
        Self {
            concepts: Arc::new(Mutex::new(concepts)),
            native: false,
            fetch_delay: None,
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            topk_calls: Arc::new(AtomicUsize::new(0)),
            fail_fetch: Arc::new(AtomicBool::new(false)),
            last_variant: Arc::new(Mutex::new(None)),
        }
    }

    /// Report a native similarity index and serve top-k by brute force.
    pub fn with_native_index(mut self) -> Self {
        self.native = true;
        self
    }

    /// Sleep this long inside every candidate fetch, to widen race windows.
    pub fn with_fetch_delay(mut self, delay: Duration) -> Self {
        self.fetch_delay = Some(delay);
        self
    }

    /// Make the next candidate fetch fail with a store error.
    pub fn fail_next_fetch(&self) {
        self.fail_fetch.store(true, Ordering::SeqCst);
    }

    /// Replace the stored corpus.
    pub fn set_concepts(&self, concepts: Vec<Concept>) {
        *self.concepts.lock().unwrap() = concepts;
    }

    /// Variant passed to the most recent fetch or top-k call.
    pub fn last_variant(&self) -> Option<ModelVariant> {
        *self.last_variant.lock().unwrap()
    }

    fn matching(&self, source_types: Option<&[SourceType]>) -> Vec<Concept> {
        self.concepts
            .lock()
            .unwrap()
            .iter()
            .filter(|concept| {
                source_types
                    .map(|types| types.is_empty() || types.contains(&concept.source_type))
                    .unwrap_or(true)
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ConceptStore for MemoryStore {
    async fn fetch_candidates(
        &self,
        source_types: Option<&[SourceType]>,
        variant: ModelVariant,
    ) -> Result<Vec<Concept>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_variant.lock().unwrap() = Some(variant);
        if let Some(delay) = self.fetch_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_fetch.swap(false, Ordering::SeqCst) {
            return Err(SearchError::store("injected store failure"));
        }
        Ok(self.matching(source_types))
    }

    async fn native_index_available(&self, _variant: ModelVariant) -> Result<bool> {
        Ok(self.native)
    }

    async fn native_topk(
        &self,
        query: &[f16],
        k: usize,
        source_types: Option<&[SourceType]>,
        variant: ModelVariant,
    ) -> Result<Vec<(Concept, f32)>> {
        self.topk_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_variant.lock().unwrap() = Some(variant);
        let mut scored: Vec<(Concept, f32)> = self
            .matching(source_types)
            .into_iter()
            .filter_map(|concept| {
                let embedding = concept.embedding.clone()?;
                let similarity = cosine_similarity(query, &embedding);
                Some((concept, similarity))
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        Ok(scored)
    }

    async fn upsert_concepts(
        &self,
        concepts: Vec<Concept>,
        _variant: ModelVariant,
    ) -> Result<Vec<i64>> {
        let mut stored = self.concepts.lock().unwrap();
        let mut ids = Vec::with_capacity(concepts.len());
        for mut concept in concepts {
            let next_id = stored
                .iter()
                .filter_map(|c| c.id)
                .max()
                .unwrap_or(0)
                + 1;
            let id = concept.id.unwrap_or(next_id);
            concept.id = Some(id);
            stored.retain(|c| c.id != Some(id));
            stored.push(concept);
            ids.push(id);
        }
        Ok(ids)
    }

    async fn concept_count(&self, _variant: ModelVariant) -> Result<u64> {
        Ok(self.concepts.lock().unwrap().len() as u64)
    }
}
