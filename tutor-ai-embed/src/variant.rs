//! Named embedding model variants
//!
//! Query vectors are only comparable to concept vectors produced by the same
//! variant, so every stored vector is keyed by the variant id and the
//! dimensionality of each variant is known statically. That lets callers
//! detect a variant mismatch before loading any model.

use fastembed::EmbeddingModel;
use serde::{Deserialize, Serialize};

/// Selectable embedding model configuration.
///
/// Each variant maps to a built-in fastembed ONNX model with a fixed
/// dimensionality. Swapping variants at runtime is supported; models are
/// loaded lazily and cached per variant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Small model with the lowest latency, slightly less accurate
    Fast,
    /// Balanced quality/latency trade-off
    #[default]
    Default,
    /// Larger model, better quality, slower
    Accurate,
    /// Multilingual queries and content
    Multilingual,
}

impl ModelVariant {
    /// All supported variants, in a stable order.
    pub const ALL: [ModelVariant; 4] = [
        ModelVariant::Fast,
        ModelVariant::Default,
        ModelVariant::Accurate,
        ModelVariant::Multilingual,
    ];

    /// Stable identifier, used to key stored vectors to the model that
    /// produced them.
    pub fn id(&self) -> &'static str {
        match self {
            ModelVariant::Fast => "fast",
            ModelVariant::Default => "default",
            ModelVariant::Accurate => "accurate",
            ModelVariant::Multilingual => "multilingual",
        }
    }

    /// Dimensionality of vectors produced by this variant.
    pub fn dimension(&self) -> usize {
        match self {
            ModelVariant::Fast | ModelVariant::Default => 384,
            ModelVariant::Accurate | ModelVariant::Multilingual => 768,
        }
    }

    /// The fastembed built-in model backing this variant.
    pub fn embedding_model(&self) -> EmbeddingModel {
        match self {
            ModelVariant::Fast => EmbeddingModel::AllMiniLML6V2,
            ModelVariant::Default => EmbeddingModel::AllMiniLML12V2,
            ModelVariant::Accurate => EmbeddingModel::BGEBaseENV15,
            ModelVariant::Multilingual => EmbeddingModel::ParaphraseMLMpnetBaseV2,
        }
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id())
    }
}

impl std::str::FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(ModelVariant::Fast),
            "default" => Ok(ModelVariant::Default),
            "accurate" => Ok(ModelVariant::Accurate),
            "multilingual" => Ok(ModelVariant::Multilingual),
            _ => Err(format!("unknown model variant: {s}")),
        }
    }
}
