//! Error types for the search pipeline

use tutor_ai_embed::EmbedError;

/// Result type for search operations.
pub type Result<T> = std::result::Result<T, SearchError>;

/// Failures surfaced by the search pipeline.
///
/// All variants are `Clone` so that a single failed computation can be fanned
/// out to every caller waiting on the same single-flight key. Per-candidate
/// data issues (a missing embedding, a dimension mismatch) are recovered
/// locally by excluding the candidate with a logged warning; everything here
/// aborts the current search call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SearchError {
    /// The query was empty or whitespace-only
    #[error("query must not be empty")]
    EmptyQuery,

    /// The embedding model could not be loaded or failed on the query
    #[error("embedding failed: {message}")]
    Embedding { message: String },

    /// A candidate vector's length disagrees with the query vector's length.
    /// Recoverable per candidate; only fatal if raised outside scoring.
    #[error("vector dimension {actual} does not match expected dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The caller-supplied timeout elapsed before the search completed
    #[error("search timed out")]
    Timeout,

    /// The concept store is unreachable or failed; retry policy belongs to
    /// the caller, not this crate
    #[error("concept store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// Async machinery faults (task join, channel closed)
    #[error("search task failed: {message}")]
    Task { message: String },
}

impl SearchError {
    /// Wrap a store-side failure.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::StoreUnavailable {
            message: err.to_string(),
        }
    }

    /// Wrap an async machinery failure.
    pub fn task(err: impl std::fmt::Display) -> Self {
        Self::Task {
            message: err.to_string(),
        }
    }
}

impl From<EmbedError> for SearchError {
    fn from(err: EmbedError) -> Self {
        match err {
            EmbedError::EmptyText => SearchError::EmptyQuery,
            other => SearchError::Embedding {
                message: other.to_string(),
            },
        }
    }
}

impl From<sqlx::Error> for SearchError {
    fn from(err: sqlx::Error) -> Self {
        SearchError::store(err)
    }
}
