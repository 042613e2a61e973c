//! Core data model: concepts, search requests, and ranked results

use half::f16;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tutor_ai_embed::ModelVariant;

/// Default maximum number of results per search.
pub const DEFAULT_LIMIT: usize = 10;

/// Default minimum similarity for a result to be kept.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Trust level of the source that contributed a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    /// Course material authored by the course itself
    Official,
    /// Material contributed by teachers
    Teacher,
    /// Material contributed by students
    Student,
}

impl SourceType {
    /// Fixed credibility weight for this source type, used unless the store
    /// carries a per-concept override.
    pub fn default_credibility(&self) -> f32 {
        match self {
            SourceType::Official => 1.0,
            SourceType::Teacher => 0.9,
            SourceType::Student => 0.6,
        }
    }

    /// Stable identifier as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Official => "official",
            SourceType::Teacher => "teacher",
            SourceType::Student => "student",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "official" => Ok(SourceType::Official),
            "teacher" => Ok(SourceType::Teacher),
            "student" => Ok(SourceType::Student),
            _ => Err(format!("unknown source type: {s}")),
        }
    }
}

/// A unit of course knowledge with a precomputed embedding.
///
/// The embedding is produced from the concatenated text fields and is only
/// meaningful for the model variant it was generated with. A concept without
/// an embedding is unscoreable and is excluded from ranking, not an error.
#[derive(Debug, Clone)]
pub struct Concept {
    /// Store-assigned id (None for concepts not yet persisted)
    pub id: Option<i64>,
    pub name: String,
    pub definition: String,
    pub example: Option<String>,
    pub source_type: SourceType,
    /// Per-concept credibility override; falls back to the source type default
    pub credibility_score: Option<f32>,
    pub embedding: Option<Vec<f16>>,
}

impl Concept {
    pub fn new(
        name: impl Into<String>,
        definition: impl Into<String>,
        source_type: SourceType,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            definition: definition.into(),
            example: None,
            source_type,
            credibility_score: None,
            embedding: None,
        }
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f16>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_credibility(mut self, credibility: f32) -> Self {
        self.credibility_score = Some(credibility);
        self
    }

    /// The text embedded for this concept: name, definition, and example
    /// joined with spaces.
    pub fn embedding_text(&self) -> String {
        let example = self.example.as_deref().unwrap_or("");
        format!("{} {} {}", self.name, self.definition, example)
            .trim()
            .to_string()
    }

    /// Effective credibility weight for ranking.
    pub fn credibility(&self) -> f32 {
        self.credibility_score
            .unwrap_or_else(|| self.source_type.default_credibility())
    }
}

/// Parameters for a single search call.
#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// Free-text query; must be non-empty
    pub query: String,
    /// Maximum number of results to return
    pub limit: usize,
    /// Minimum similarity in [0, 1] for a result to be kept
    pub threshold: f32,
    /// Restrict eligible source types; None means all types are eligible
    pub source_types: Option<Vec<SourceType>>,
    /// Model variant that produces the query vector; None falls back to the
    /// engine's configured variant. Must match the variant used to embed the
    /// candidate pool
    pub variant: Option<ModelVariant>,
    /// When false, the cache lookup is bypassed but the fresh result is
    /// still written back (refresh semantics)
    pub use_cache: bool,
    /// Bounds the embedding and scoring phases from this caller's view
    pub timeout: Option<Duration>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_LIMIT,
            threshold: DEFAULT_THRESHOLD,
            source_types: None,
            variant: None,
            use_cache: true,
            timeout: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_source_types(mut self, source_types: Vec<SourceType>) -> Self {
        self.source_types = Some(source_types);
        self
    }

    pub fn with_variant(mut self, variant: ModelVariant) -> Self {
        self.variant = Some(variant);
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The variant this request resolves to, falling back to the given
    /// configured default when the caller did not specify one.
    pub fn variant_or(&self, default: ModelVariant) -> ModelVariant {
        self.variant.unwrap_or(default)
    }

    /// Threshold with out-of-range values clamped back to the default.
    pub fn effective_threshold(&self) -> f32 {
        if (0.0..=1.0).contains(&self.threshold) {
            self.threshold
        } else {
            tracing::warn!(
                "threshold {} outside [0, 1], using default {DEFAULT_THRESHOLD}",
                self.threshold
            );
            DEFAULT_THRESHOLD
        }
    }

    /// Query text normalized for cache keying.
    pub(crate) fn normalized_query(&self) -> String {
        self.query.trim().to_lowercase()
    }
}

/// One ranked search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchResult {
    pub concept_id: i64,
    pub name: String,
    pub definition: String,
    pub example: Option<String>,
    pub source_type: SourceType,
    /// Cosine similarity between query and concept vectors
    pub similarity: f32,
    /// `similarity * credibility`; the primary sort key
    pub combined_score: f32,
    /// 1-based position after the final sort
    pub rank: usize,
}
