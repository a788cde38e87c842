//! Chunk records exchanged between chunkers and refineries.

use serde::{Deserialize, Serialize};

/// Neighbouring text a refinery attached to a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Borrowed text, verbatim from the neighbouring chunk.
    pub text: String,
    /// Token count of `text` under the refinery's counter.
    pub token_count: usize,
    /// Character offset of the borrowed text in the source document.
    pub start_index: usize,
    /// Character offset one past the end of the borrowed text.
    pub end_index: usize,
}

/// A contiguous span of segmented text plus its positional metadata.
///
/// Offsets are character (not byte) positions in the source document, matching what chunkers
/// report upstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk content.
    pub text: String,
    /// Character offset where the chunk starts.
    pub start_index: usize,
    /// Character offset one past the last character of the chunk.
    pub end_index: usize,
    /// Number of tokens in `text`.
    pub token_count: usize,
    /// Context attached by a refinery, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Context>,
}

impl Chunk {
    /// Build a chunk without refinery context.
    pub fn new(
        text: impl Into<String>,
        start_index: usize,
        end_index: usize,
        token_count: usize,
    ) -> Self {
        Self {
            text: text.into(),
            start_index,
            end_index,
            token_count,
            context: None,
        }
    }

    /// Character length of the chunk text.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
