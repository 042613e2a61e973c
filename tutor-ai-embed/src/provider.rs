//! Embedding provider implementations

use crate::error::{EmbedError, Result};
use crate::variant::ModelVariant;
use async_trait::async_trait;
use fastembed::{InitOptions, TextEmbedding};
use half::f16;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

/// Result of batch embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingBatch {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f16>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingBatch {
    /// Create a batch from generated vectors, inferring the dimension from
    /// the first entry (0 if empty).
    pub fn new(embeddings: Vec<Vec<f16>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    /// Number of embedding vectors in this batch.
    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    /// Returns `true` if this batch contains no embedding vectors.
    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Shared handle to a loaded model. fastembed's embed takes `&mut self`, so
/// concurrent users serialize on the mutex.
type SharedModel = Arc<Mutex<TextEmbedding>>;

/// Global cache of initialized models, one per variant, to avoid reloading
static MODEL_CACHE: OnceLock<Mutex<HashMap<ModelVariant, SharedModel>>> = OnceLock::new();

fn model_cache() -> &'static Mutex<HashMap<ModelVariant, SharedModel>> {
    MODEL_CACHE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Trait for embedding providers that can generate vectors from text.
///
/// Deterministic for a fixed `(variant, text)` pair. Empty text is rejected
/// with [`EmbedError::EmptyText`] rather than producing a meaningless vector.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding for a single text using the given variant
    async fn embed_text(&self, text: &str, variant: ModelVariant) -> Result<Vec<f16>>;

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String], variant: ModelVariant)
    -> Result<EmbeddingBatch>;

    /// Dimension of embeddings produced by the given variant
    fn dimension(&self, variant: ModelVariant) -> usize;

    /// Name/identifier of this provider
    fn provider_name(&self) -> &str;
}

/// FastEmbed-based embedding provider using built-in ONNX models.
///
/// Models are loaded lazily on first use of a variant and cached process-wide,
/// so constructing multiple providers is cheap. Inference runs on the blocking
/// thread pool. Output vectors are L2-normalized f16.
#[derive(Debug, Clone)]
pub struct FastEmbedProvider {
    batch_size: usize,
}

impl FastEmbedProvider {
    /// Create a provider with the default inference batch size.
    pub fn new() -> Self {
        Self { batch_size: 16 }
    }

    /// Set the maximum number of texts passed to the model per inference call.
    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Clears the global model cache, forcing models to reload on next use.
    pub fn clear_model_cache() {
        let mut cache = model_cache().lock().unwrap();
        cache.clear();
        tracing::info!("model cache cleared");
    }

    /// Number of models currently loaded in the global cache.
    pub fn cached_model_count() -> usize {
        model_cache().lock().unwrap().len()
    }

    /// Get the cached model for a variant, loading it on first use.
    async fn model_for(&self, variant: ModelVariant) -> Result<SharedModel> {
        {
            let cache = model_cache().lock().unwrap();
            if let Some(model) = cache.get(&variant) {
                return Ok(Arc::clone(model));
            }
        }

        tracing::info!("loading embedding model for variant: {variant}");
        let loaded = tokio::task::spawn_blocking(move || -> Result<TextEmbedding> {
            let init_options =
                InitOptions::new(variant.embedding_model()).with_show_download_progress(false);
            let mut model =
                TextEmbedding::try_new(init_options).map_err(|e| EmbedError::External {
                    source: e,
                })?;

            // Probe once so a dimension drift between fastembed and our
            // static table fails loudly at load time, not at scoring time.
            let probe = model
                .embed(vec!["dimension probe".to_string()], None)
                .map_err(|e| EmbedError::External { source: e })?;
            let dimension = probe.first().map(|emb| emb.len()).unwrap_or(0);
            if dimension != variant.dimension() {
                return Err(EmbedError::External {
                    source: anyhow::anyhow!(
                        "model for variant '{variant}' produced dimension {dimension}, expected {}",
                        variant.dimension()
                    ),
                });
            }

            tracing::info!("model loaded for variant {variant}, dimension {dimension}");
            Ok(model)
        })
        .await??;

        let model_arc = Arc::new(Mutex::new(loaded));
        let mut cache = model_cache().lock().unwrap();
        // Another task may have loaded the same variant while we did; keep
        // the first one so all users share a single model instance.
        let entry = cache
            .entry(variant)
            .or_insert_with(|| Arc::clone(&model_arc));
        Ok(Arc::clone(entry))
    }

    /// Convert f32 model output to L2-normalized f16 vectors.
    fn normalize_to_f16(embeddings: Vec<Vec<f32>>) -> Vec<Vec<f16>> {
        embeddings
            .into_iter()
            .map(|embedding| {
                let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm > 0.0 {
                    embedding
                        .into_iter()
                        .map(|x| f16::from_f32(x / norm))
                        .collect()
                } else {
                    embedding.into_iter().map(f16::from_f32).collect()
                }
            })
            .collect()
    }
}

impl Default for FastEmbedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_text(&self, text: &str, variant: ModelVariant) -> Result<Vec<f16>> {
        let texts = vec![text.to_string()];
        let batch = self.embed_texts(&texts, variant).await?;
        batch
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::External {
                source: anyhow::anyhow!("no embedding generated for text"),
            })
    }

    async fn embed_texts(
        &self,
        texts: &[String],
        variant: ModelVariant,
    ) -> Result<EmbeddingBatch> {
        if texts.is_empty() {
            return Ok(EmbeddingBatch::new(vec![]));
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbedError::EmptyText);
        }

        let model = self.model_for(variant).await?;
        tracing::debug!("generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.batch_size) {
            let chunk = chunk.to_vec();
            let model_clone = Arc::clone(&model);

            let batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut model_guard = model_clone.lock().unwrap();
                model_guard
                    .embed(chunk, None)
                    .map_err(|e| EmbedError::External { source: e })
            })
            .await??;

            all_embeddings.extend(Self::normalize_to_f16(batch));
        }

        tracing::debug!("generated {} embeddings", all_embeddings.len());
        Ok(EmbeddingBatch::new(all_embeddings))
    }

    fn dimension(&self, variant: ModelVariant) -> usize {
        variant.dimension()
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}
