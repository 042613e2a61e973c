//! Concept store abstraction
//!
//! The store owns concept persistence and precomputed vectors; the search
//! core only reads from it. Two retrieval strategies sit behind one trait:
//! a full-scan path ([`ConceptStore::fetch_candidates`], scored in-process)
//! and an optional store-native approximate top-k path
//! ([`ConceptStore::native_topk`]), selected at runtime from the
//! store-reported capability ([`ConceptStore::native_index_available`]).
//!
//! ```text
//! RankingEngine ── ConceptStore (trait) ── SqliteConceptStore (concrete)
//! ```

use crate::concept::{Concept, SourceType};
use crate::error::Result;
use async_trait::async_trait;
use half::f16;
use tutor_ai_embed::ModelVariant;

pub mod sqlite_store;

/// Backing store of concept records and their vectors.
///
/// All failures map to [`crate::SearchError::StoreUnavailable`]; the core
/// never retries internally.
#[async_trait]
pub trait ConceptStore: Send + Sync {
    /// Fetch the eligible candidate pool for in-process scoring, optionally
    /// pre-filtered by source type at the store level to reduce transfer.
    async fn fetch_candidates(
        &self,
        source_types: Option<&[SourceType]>,
        variant: ModelVariant,
    ) -> Result<Vec<Concept>>;

    /// Whether the store can serve approximate top-k natively for vectors of
    /// this variant.
    async fn native_index_available(&self, variant: ModelVariant) -> Result<bool>;

    /// Store-native approximate top-k by similarity. Results are limited to
    /// `k` and approximately ranked; the caller re-applies threshold and
    /// credibility weighting regardless.
    async fn native_topk(
        &self,
        query: &[f16],
        k: usize,
        source_types: Option<&[SourceType]>,
        variant: ModelVariant,
    ) -> Result<Vec<(Concept, f32)>>;

    /// Insert or update concepts for a variant, returning their ids.
    /// Administrative; used by index tooling and tests, never by ranking.
    async fn upsert_concepts(
        &self,
        concepts: Vec<Concept>,
        variant: ModelVariant,
    ) -> Result<Vec<i64>>;

    /// Number of stored concepts embedded with the given variant.
    async fn concept_count(&self, variant: ModelVariant) -> Result<u64>;
}
