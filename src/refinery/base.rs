//! The refinement contract shared by every strategy.

use super::dispatch::{self, Chunks};
use super::error::RefineryError;
use crate::types::Chunk;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Validated settings common to every refinery.
///
/// `context_size` bounds how much neighbouring content a strategy may attach to each chunk. It is
/// fixed at construction; nothing exposes a setter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RefineryConfig {
    context_size: usize,
}

impl RefineryConfig {
    /// Validate a raw context size.
    ///
    /// Negative values are rejected with [`RefineryError::InvalidConfiguration`].
    pub fn new(context_size: i64) -> Result<Self, RefineryError> {
        if context_size < 0 {
            return Err(RefineryError::InvalidConfiguration(format!(
                "context_size must be non-negative, got {context_size}"
            )));
        }
        let context_size = usize::try_from(context_size).map_err(|_| {
            RefineryError::InvalidConfiguration(format!(
                "context_size {context_size} does not fit this platform"
            ))
        })?;
        Ok(Self { context_size })
    }

    /// Configured context size.
    pub const fn context_size(&self) -> usize {
        self.context_size
    }
}

impl TryFrom<i64> for RefineryConfig {
    type Error = RefineryError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Human readable identity of a refinery, for logs and debugging output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefineryDescriptor {
    /// Strategy type name.
    pub name: String,
    /// Configured context size.
    pub context_size: usize,
}

impl fmt::Display for RefineryDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(context_size={})", self.name, self.context_size)
    }
}

/// A strategy that enriches the chunks of a document.
///
/// Implementors supply [`Refinery::refine`], [`Refinery::is_available`] and access to their
/// [`RefineryConfig`]; batching, shape dispatch and the descriptor come for free. Refinement is
/// expected to return as many chunks as it was given, in the same order.
pub trait Refinery: Send + Sync {
    /// Settings fixed at construction.
    fn config(&self) -> &RefineryConfig;

    /// Refine the chunks of a single document.
    fn refine(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>, RefineryError>;

    /// Whether the strategy's runtime dependencies are present.
    fn is_available() -> bool
    where
        Self: Sized;

    /// Refine several documents, one after another.
    ///
    /// Stops at the first failing document and returns its error; no partial batch is returned.
    fn refine_batch(&self, batch: Vec<Vec<Chunk>>) -> Result<Vec<Vec<Chunk>>, RefineryError> {
        batch.into_iter().map(|chunks| self.refine(chunks)).collect()
    }

    /// Configured context size.
    fn context_size(&self) -> usize {
        self.config().context_size()
    }

    /// Short type name of the strategy.
    fn name(&self) -> &'static str {
        short_type_name(std::any::type_name::<Self>())
    }

    /// Name and context size, rendered as `Name(context_size=N)`.
    fn descriptor(&self) -> RefineryDescriptor {
        RefineryDescriptor {
            name: self.name().to_string(),
            context_size: self.context_size(),
        }
    }

    /// Refine either a single document or a batch, returning the shape that was passed in.
    ///
    /// Empty inputs are returned untouched. A batch whose first document is empty is rejected
    /// with [`RefineryError::InvalidInput`].
    fn invoke(&self, chunks: Chunks) -> Result<Chunks, RefineryError> {
        dispatch::invoke(self, chunks)
    }

    /// Like [`Refinery::invoke`] but sniffs the shape of untyped JSON.
    ///
    /// Non-array values and empty arrays come back unchanged.
    fn invoke_value(&self, input: Value) -> Result<Value, RefineryError> {
        dispatch::invoke_value(self, input)
    }
}

fn short_type_name(full: &'static str) -> &'static str {
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
