use crate::tokenizer::TokenizerError;
use thiserror::Error;

/// Message used whenever an input is neither a chunk sequence nor a batch of chunk sequences.
const INVALID_INPUT_SHAPE: &str =
    "must be a sequence of Chunk or a sequence of sequences of Chunk";

/// Errors produced by refineries and the entry points that dispatch to them.
#[derive(Debug, Error)]
pub enum RefineryError {
    /// The refinery was constructed with an unusable configuration.
    #[error("invalid refinery configuration: {0}")]
    InvalidConfiguration(String),
    /// Input shape did not match a chunk sequence or a batch of chunk sequences.
    #[error("invalid input type for refinery: {0}")]
    InvalidInput(String),
    /// The strategy's runtime dependencies are missing.
    #[error("refinery '{refinery}' is not available in this environment")]
    Unavailable {
        /// Name of the unavailable strategy.
        refinery: String,
    },
    /// Token counter could not be built for the strategy.
    #[error("failed to prepare token counter: {0}")]
    Tokenizer(#[from] TokenizerError),
    /// A concrete strategy failed while refining a document.
    #[error("refinery '{refinery}' failed: {reason}")]
    Strategy {
        /// Name of the failing strategy.
        refinery: String,
        /// Human readable failure description.
        reason: String,
    },
    /// Chunks could not be converted to or from JSON.
    #[error("failed to convert chunks: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RefineryError {
    pub(crate) fn invalid_input() -> Self {
        Self::InvalidInput(INVALID_INPUT_SHAPE.to_string())
    }

    pub(crate) fn invalid_input_with(detail: impl std::fmt::Display) -> Self {
        Self::InvalidInput(format!("{INVALID_INPUT_SHAPE} ({detail})"))
    }
}
