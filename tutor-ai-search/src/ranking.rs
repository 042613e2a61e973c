//! Credibility-weighted semantic ranking
//!
//! The engine embeds the query, retrieves candidates from the store (via the
//! store's native similarity index when available, or a full scan scored
//! in-process), filters by similarity threshold, weights by source
//! credibility, and produces a deterministically ordered result list.
//!
//! In-process scoring partitions candidates into fixed-size batches and runs
//! them on the blocking pool with a bounded number in flight. Workers tag
//! partial results with the concept itself, so the final ordering comes only
//! from the central sort, never from batch completion order.

use crate::concept::{Concept, SearchRequest, SearchResult};
use crate::config::SearchConfig;
use crate::error::{Result, SearchError};
use crate::store::ConceptStore;
use futures::stream::{self, StreamExt};
use half::f16;
use std::sync::Arc;
use std::time::Instant;
use tutor_ai_embed::{EmbeddingProvider, ModelVariant};

/// Cap on the K requested from a native index, to avoid flooding the store.
const NATIVE_TOPK_CAP: usize = 100;

/// Stateless ranking pipeline over a concept store and embedding provider.
///
/// Holds only configuration; safe to share behind an [`Arc`] and call
/// concurrently. Performs no writes beyond store reads.
pub struct RankingEngine {
    provider: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn ConceptStore>,
    config: SearchConfig,
}

impl RankingEngine {
    pub fn new(
        provider: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn ConceptStore>,
        config: SearchConfig,
    ) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Run the full ranking pipeline for one request.
    ///
    /// Returns results ordered by combined score (similarity × credibility)
    /// descending, at most `request.limit` of them, each with a 1-based rank.
    /// An empty list means nothing cleared the threshold; that is not an
    /// error.
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let threshold = request.effective_threshold();
        let variant = request.variant_or(self.config.variant);
        let started = Instant::now();
        tracing::info!(variant = %variant, "starting semantic search");

        let query_vector = self.provider.embed_text(query, variant).await?;

        let scored = if self.config.native_index
            && self.store.native_index_available(variant).await?
        {
            // Over-fetch so threshold and source filtering still leave
            // enough results to fill the limit.
            let k = request.limit.max((request.limit * 3).min(NATIVE_TOPK_CAP));
            tracing::debug!("delegating top-{k} retrieval to the native index");
            self.store
                .native_topk(&query_vector, k, request.source_types.as_deref(), variant)
                .await?
        } else {
            self.score_candidates(&query_vector, request, variant).await?
        };

        let results = finalize(scored, threshold, request.limit);
        tracing::info!(
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(results)
    }

    /// Full-scan path: fetch eligible candidates and score them in parallel
    /// batches on the blocking pool.
    async fn score_candidates(
        &self,
        query_vector: &[f16],
        request: &SearchRequest,
        variant: ModelVariant,
    ) -> Result<Vec<(Concept, f32)>> {
        let candidates = self
            .store
            .fetch_candidates(request.source_types.as_deref(), variant)
            .await?;
        tracing::debug!("scoring {} candidates in-process", candidates.len());
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query: Arc<[f16]> = query_vector.into();
        let batches: Vec<Vec<Concept>> = candidates
            .chunks(self.config.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect();

        let mut partials = stream::iter(batches.into_iter().map(|batch| {
            let query = Arc::clone(&query);
            tokio::task::spawn_blocking(move || score_batch(&query, batch))
        }))
        .buffer_unordered(self.config.worker_pool_size);

        let mut scored = Vec::new();
        while let Some(joined) = partials.next().await {
            let partial = joined.map_err(SearchError::task)?;
            scored.extend(partial);
        }
        Ok(scored)
    }
}

/// Score one batch of candidates against the query vector.
///
/// Candidates without an embedding or with a mismatched dimension are
/// excluded here with a logged warning rather than failing the search;
/// partial data corruption should not block the other candidates.
fn score_batch(query: &[f16], batch: Vec<Concept>) -> Vec<(Concept, f32)> {
    batch
        .into_iter()
        .filter_map(|concept| {
            let Some(embedding) = concept.embedding.as_deref() else {
                tracing::debug!("skipping unscoreable concept '{}': no embedding", concept.name);
                return None;
            };
            if embedding.len() != query.len() {
                tracing::warn!(
                    "skipping concept '{}': {}",
                    concept.name,
                    SearchError::DimensionMismatch {
                        expected: query.len(),
                        actual: embedding.len(),
                    }
                );
                return None;
            }
            let similarity = cosine_similarity(query, embedding);
            Some((concept, similarity))
        })
        .collect()
}

/// Cosine similarity between two f16 vectors, computed in f32.
///
/// Defined as 0 when either vector has zero norm (never divides by zero).
pub(crate) fn cosine_similarity(a: &[f16], b: &[f16]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| f32::from(*x) * f32::from(*y))
        .sum();

    let norm_a: f32 = a.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| f32::from(*x).powi(2)).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// Apply threshold and credibility weighting, sort deterministically,
/// truncate, and assign ranks.
fn finalize(scored: Vec<(Concept, f32)>, threshold: f32, limit: usize) -> Vec<SearchResult> {
    let mut weighted: Vec<(Concept, f32, f32)> = scored
        .into_iter()
        .filter(|(_, similarity)| *similarity >= threshold)
        .map(|(concept, similarity)| {
            let combined = similarity * concept.credibility();
            (concept, similarity, combined)
        })
        .collect();

    // Deterministic regardless of batch completion or store iteration order:
    // combined score desc, then similarity desc, then id asc.
    weighted.sort_by(|a, b| {
        b.2.total_cmp(&a.2)
            .then(b.1.total_cmp(&a.1))
            .then(a.0.id.unwrap_or(i64::MAX).cmp(&b.0.id.unwrap_or(i64::MAX)))
    });
    weighted.truncate(limit);

    weighted
        .into_iter()
        .enumerate()
        .map(|(index, (concept, similarity, combined))| SearchResult {
            concept_id: concept.id.unwrap_or(0),
            name: concept.name,
            definition: concept.definition,
            example: concept.example,
            source_type: concept.source_type,
            similarity,
            combined_score: combined,
            rank: index + 1,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::SourceType;
    use crate::testutil::{MemoryStore, StaticEmbedder, concept, vector};
    use std::sync::atomic::Ordering;

    fn engine_with(store: MemoryStore, embedder: StaticEmbedder, config: SearchConfig) -> RankingEngine {
        RankingEngine::new(Arc::new(embedder), Arc::new(store), config)
    }

    /// Standard fixture: A matches strongly (official), B matches strongly
    /// (student), C is unrelated.
    fn course_fixture() -> (MemoryStore, StaticEmbedder) {
        let store = MemoryStore::new(vec![
            concept(1, "systems thinking", SourceType::Official, &[1.0, 0.0, 0.0, 0.0]),
            concept(2, "systems thinking variant", SourceType::Student, &[0.98, 0.17, 0.0, 0.0]),
            concept(3, "unrelated topic", SourceType::Official, &[0.0, 1.0, 0.0, 0.0]),
        ]);
        let embedder = StaticEmbedder::new(4).with_vector("systems thinking", &[1.0, 0.0, 0.0, 0.0]);
        (store, embedder)
    }

    #[test]
    fn test_cosine_similarity_bounds() {
        let a = vector(&[1.0, 0.0]);
        let b = vector(&[0.0, 1.0]);
        let c = vector(&[-1.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &a), 1.0);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
        assert_eq!(cosine_similarity(&a, &c), -1.0);
    }

    #[test]
    fn test_cosine_similarity_zero_norm() {
        let zero = vector(&[0.0, 0.0]);
        let a = vector(&[1.0, 0.0]);
        assert_eq!(cosine_similarity(&zero, &a), 0.0);
        assert_eq!(cosine_similarity(&a, &zero), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch_guard() {
        let a = vector(&[1.0, 0.0]);
        let b = vector(&[1.0, 0.0, 0.0]);
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[tokio::test]
    async fn test_credibility_weighting_orders_results() {
        let (store, embedder) = course_fixture();
        let engine = engine_with(store, embedder, SearchConfig::default());

        let request = SearchRequest::new("systems thinking").with_threshold(0.5);
        let results = engine.search(&request).await.unwrap();

        // A above B despite comparable similarity; C excluded by threshold.
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].concept_id, 1);
        assert_eq!(results[1].concept_id, 2);
        assert_eq!(results[0].rank, 1);
        assert_eq!(results[1].rank, 2);
        assert!(results[0].combined_score > results[1].combined_score);
        for result in &results {
            assert!(result.similarity >= 0.5);
        }
    }

    #[tokio::test]
    async fn test_source_type_filter() {
        let (store, embedder) = course_fixture();
        let engine = engine_with(store, embedder, SearchConfig::default());

        let request = SearchRequest::new("systems thinking")
            .with_threshold(0.5)
            .with_source_types(vec![SourceType::Official]);
        let results = engine.search(&request).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].concept_id, 1);
    }

    #[tokio::test]
    async fn test_limit_truncation_and_ranks() {
        let (store, embedder) = course_fixture();
        let engine = engine_with(store, embedder, SearchConfig::default());

        let request = SearchRequest::new("systems thinking")
            .with_threshold(0.0)
            .with_limit(2);
        let results = engine.search(&request).await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_empty_query_is_rejected() {
        let (store, embedder) = course_fixture();
        let engine = engine_with(store, embedder, SearchConfig::default());

        let err = engine.search(&SearchRequest::new("   ")).await.unwrap_err();
        assert_eq!(err, SearchError::EmptyQuery);
    }

    #[tokio::test]
    async fn test_unscoreable_candidates_are_skipped_not_fatal() {
        let mut missing = concept(4, "no embedding", SourceType::Official, &[1.0, 0.0, 0.0, 0.0]);
        missing.embedding = None;
        // Wrong dimensionality relative to the 4-dim query vector
        let mismatched = concept(5, "corrupt", SourceType::Official, &[1.0, 0.0]);

        let store = MemoryStore::new(vec![
            concept(1, "systems thinking", SourceType::Official, &[1.0, 0.0, 0.0, 0.0]),
            missing,
            mismatched,
        ]);
        let embedder = StaticEmbedder::new(4).with_vector("systems thinking", &[1.0, 0.0, 0.0, 0.0]);
        let engine = engine_with(store, embedder, SearchConfig::default());

        let results = engine
            .search(&SearchRequest::new("systems thinking").with_threshold(0.5))
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].concept_id, 1);
    }

    #[tokio::test]
    async fn test_deterministic_ordering_under_parallel_scoring() {
        // Many identical-vector concepts across several batches; ties must
        // resolve by id regardless of completion order.
        let concepts: Vec<_> = (1..=50)
            .map(|id| concept(id, format!("concept {id}"), SourceType::Official, &[1.0, 0.0, 0.0, 0.0]))
            .collect();
        let store = MemoryStore::new(concepts);
        let embedder = StaticEmbedder::new(4).with_vector("q", &[1.0, 0.0, 0.0, 0.0]);
        let engine = engine_with(
            store,
            embedder,
            SearchConfig::default().with_batch_size(4).with_worker_pool_size(8),
        );

        let request = SearchRequest::new("q").with_threshold(0.5).with_limit(50);
        let first = engine.search(&request).await.unwrap();
        let second = engine.search(&request).await.unwrap();

        let ids: Vec<i64> = first.iter().map(|r| r.concept_id).collect();
        assert_eq!(ids, (1..=50).collect::<Vec<i64>>());
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_native_index_path_matches_ordering_contract() {
        let (store, embedder) = course_fixture();
        let store = store.with_native_index();
        let engine = engine_with(store, embedder, SearchConfig::default());

        let results = engine
            .search(&SearchRequest::new("systems thinking").with_threshold(0.5))
            .await
            .unwrap();

        // Same ordering contract as the full-scan path.
        assert_eq!(
            results.iter().map(|r| r.concept_id).collect::<Vec<_>>(),
            vec![1, 2]
        );
    }

    #[tokio::test]
    async fn test_native_index_path_counters() {
        let (store, embedder) = course_fixture();
        let store = store.with_native_index();
        let topk_calls = Arc::clone(&store.topk_calls);
        let fetch_calls = Arc::clone(&store.fetch_calls);
        let engine = engine_with(store, embedder, SearchConfig::default());

        engine
            .search(&SearchRequest::new("systems thinking"))
            .await
            .unwrap();
        assert_eq!(topk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_native_index_disabled_by_config() {
        let (store, embedder) = course_fixture();
        let store = store.with_native_index();
        let topk_calls = Arc::clone(&store.topk_calls);
        let fetch_calls = Arc::clone(&store.fetch_calls);
        let engine = engine_with(
            store,
            embedder,
            SearchConfig::default().with_native_index(false),
        );

        engine
            .search(&SearchRequest::new("systems thinking"))
            .await
            .unwrap();
        assert_eq!(topk_calls.load(Ordering::SeqCst), 0);
        assert_eq!(fetch_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_configured_variant_used_when_request_omits_one() {
        let (store, embedder) = course_fixture();
        let store_handle = store.clone();
        let engine = engine_with(
            store,
            embedder,
            SearchConfig::default().with_variant(ModelVariant::Accurate),
        );

        engine
            .search(&SearchRequest::new("systems thinking"))
            .await
            .unwrap();
        assert_eq!(store_handle.last_variant(), Some(ModelVariant::Accurate));

        // An explicit request variant overrides the configured one.
        engine
            .search(&SearchRequest::new("systems thinking").with_variant(ModelVariant::Fast))
            .await
            .unwrap();
        assert_eq!(store_handle.last_variant(), Some(ModelVariant::Fast));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let (store, embedder) = course_fixture();
        store.fail_next_fetch();
        let engine = engine_with(store, embedder, SearchConfig::default());

        let err = engine
            .search(&SearchRequest::new("systems thinking"))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::StoreUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_empty_store_yields_empty_list_not_error() {
        let store = MemoryStore::new(vec![]);
        let embedder = StaticEmbedder::new(4).with_vector("q", &[1.0, 0.0, 0.0, 0.0]);
        let engine = engine_with(store, embedder, SearchConfig::default());

        let results = engine.search(&SearchRequest::new("q")).await.unwrap();
        assert!(results.is_empty());
    }
}
