//! Hybrid semantic concept retrieval for course material
//!
//! Retrieves course concepts by meaning rather than keyword match, ranked by
//! a combination of semantic similarity and source credibility so official
//! material outranks student notes at equal relevance. Layered as:
//!
//! ```text
//! SearchCache (TTL + single-flight)
//!   └─ RankingEngine (embed, score, weight, sort)
//!        ├─ EmbeddingProvider  (tutor-ai-embed)
//!        └─ ConceptStore       (trait; SQLite included)
//! ```
//!
//! Candidate scoring runs in parallel batches on the blocking pool, or is
//! delegated wholesale to a store-native similarity index when the store
//! reports one.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tutor_ai_embed::FastEmbedProvider;
//! use tutor_ai_search::{
//!     RankingEngine, SearchCache, SearchConfig, SearchRequest, SqliteConceptStore,
//! };
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = SqliteConceptStore::open("concepts.db").await?;
//! let engine = RankingEngine::new(
//!     Arc::new(FastEmbedProvider::new()),
//!     Arc::new(store),
//!     SearchConfig::default(),
//! );
//! let cache = SearchCache::new(engine);
//!
//! let results = cache
//!     .search(&SearchRequest::new("what is a feedback loop?"))
//!     .await?;
//! for result in results {
//!     println!("#{} {} ({:.3})", result.rank, result.name, result.combined_score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod concept;
pub mod config;
pub mod error;
pub mod ranking;
pub mod store;

#[cfg(test)]
pub(crate) mod testutil;

pub use cache::{CacheStats, SearchCache};
pub use concept::{
    Concept, SearchRequest, SearchResult, SourceType, DEFAULT_LIMIT, DEFAULT_THRESHOLD,
};
pub use config::SearchConfig;
pub use error::{Result, SearchError};
pub use ranking::RankingEngine;
pub use store::{sqlite_store::SqliteConceptStore, ConceptStore};
