//! # tutor-ai-embed
//!
//! Text embedding generation for the tutor-ai concept retrieval system,
//! backed by local ONNX models via FastEmbed. Async-first with a clean
//! provider trait so the search pipeline can swap implementations.
//!
//! ## Features
//!
//! - **Local ONNX Models**: no external API calls for embedding generation
//! - **Model Variants**: named configurations (`fast`, `default`, `accurate`,
//!   `multilingual`) with statically known dimensionality
//! - **Model Caching**: each variant is loaded once per process and shared
//! - **Half-Precision**: memory-efficient L2-normalized f16 vectors
//!
//! ## Quick Start
//!
//! ```no_run
//! use tutor_ai_embed::{EmbeddingProvider, FastEmbedProvider, ModelVariant};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::new();
//! let vector = provider
//!     .embed_text("What is systems thinking?", ModelVariant::Fast)
//!     .await?;
//! assert_eq!(vector.len(), provider.dimension(ModelVariant::Fast));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`variant`]: model variant registry and dimensionality table
//! - [`provider`]: the [`EmbeddingProvider`] trait and FastEmbed implementation
//! - [`error`]: error types and result handling
//!
//! Vectors produced by different variants are not comparable; callers key
//! stored vectors by [`ModelVariant::id`] and check [`ModelVariant::dimension`]
//! before scoring.

pub mod error;
pub mod provider;
pub mod variant;

pub use error::{EmbedError, Result};
pub use provider::{EmbeddingBatch, EmbeddingProvider, FastEmbedProvider};
pub use variant::ModelVariant;
