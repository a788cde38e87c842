//! Shape detection for the uniform refinery entry points.
//!
//! Callers may hand a refinery one document (`[chunk, ...]`) or a batch (`[[chunk, ...], ...]`).
//! Detection only looks at the first element:
//!
//! - not a sequence, or an empty sequence: returned unchanged;
//! - first element is a chunk: single document;
//! - first element is a non-empty sequence starting with a chunk: batch;
//! - anything else, including an empty first document: [`RefineryError::InvalidInput`].

use super::base::Refinery;
use super::error::RefineryError;
use crate::types::Chunk;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Chunks tagged with their shape.
///
/// Serializes as the bare sequence (`[chunk, ...]` or `[[chunk, ...], ...]`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Chunks {
    /// Chunks of one document.
    Single(Vec<Chunk>),
    /// One chunk sequence per document.
    Batch(Vec<Vec<Chunk>>),
}

impl Chunks {
    /// Number of top-level elements (chunks for a single document, documents for a batch).
    pub fn len(&self) -> usize {
        match self {
            Self::Single(chunks) => chunks.len(),
            Self::Batch(batch) => batch.len(),
        }
    }

    /// Whether there are no top-level elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Vec<Chunk>> for Chunks {
    fn from(chunks: Vec<Chunk>) -> Self {
        Self::Single(chunks)
    }
}

impl From<Vec<Vec<Chunk>>> for Chunks {
    fn from(batch: Vec<Vec<Chunk>>) -> Self {
        Self::Batch(batch)
    }
}

/// Untyped JSON after shape detection.
///
/// Serializes back to the same JSON shape it was detected from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Detected {
    /// Not a sequence, or an empty one; returned unchanged by the entry points.
    PassThrough(Value),
    /// A single document or a batch.
    Chunks(Chunks),
}

/// Classify untyped JSON as a pass-through value, one document, or a batch.
///
/// Fails with [`RefineryError::InvalidInput`] when the first element is neither a chunk nor a
/// non-empty sequence starting with a chunk, or when any later element has the wrong shape.
pub fn detect_shape(input: Value) -> Result<Detected, RefineryError> {
    let items = match input {
        Value::Array(items) if !items.is_empty() => items,
        other => return Ok(Detected::PassThrough(other)),
    };

    if is_chunk(&items[0]) {
        tracing::trace!(chunks = items.len(), "Detected single chunk sequence");
        return Ok(Detected::Chunks(Chunks::Single(chunks_from_values(items)?)));
    }

    if starts_with_chunk(&items[0]) {
        tracing::trace!(documents = items.len(), "Detected batch of chunk sequences");
        let batch = items
            .into_iter()
            .enumerate()
            .map(|(position, document)| match document {
                Value::Array(chunks) => chunks_from_values(chunks),
                _ => Err(RefineryError::invalid_input_with(format!(
                    "batch element {position} is not a sequence"
                ))),
            })
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Detected::Chunks(Chunks::Batch(batch)));
    }

    Err(RefineryError::invalid_input())
}

/// Whether tagged input has anything to refine. An empty batch does not, but a batch whose first
/// document is empty is rejected.
pub(crate) fn needs_refining(chunks: &Chunks) -> Result<bool, RefineryError> {
    match chunks {
        Chunks::Single(chunks) => Ok(!chunks.is_empty()),
        Chunks::Batch(batch) => match batch.first() {
            None => Ok(false),
            Some(first) if first.is_empty() => Err(RefineryError::invalid_input()),
            Some(_) => Ok(true),
        },
    }
}

pub(crate) fn invoke<R>(refinery: &R, chunks: Chunks) -> Result<Chunks, RefineryError>
where
    R: Refinery + ?Sized,
{
    if !needs_refining(&chunks)? {
        return Ok(chunks);
    }
    match chunks {
        Chunks::Single(chunks) => refinery.refine(chunks).map(Chunks::Single),
        Chunks::Batch(batch) => refinery.refine_batch(batch).map(Chunks::Batch),
    }
}

pub(crate) fn invoke_value<R>(refinery: &R, input: Value) -> Result<Value, RefineryError>
where
    R: Refinery + ?Sized,
{
    match detect_shape(input)? {
        Detected::PassThrough(value) => Ok(value),
        Detected::Chunks(chunks) => Ok(serde_json::to_value(invoke(refinery, chunks)?)?),
    }
}

fn is_chunk(value: &Value) -> bool {
    value.is_object() && Chunk::deserialize(value).is_ok()
}

fn starts_with_chunk(value: &Value) -> bool {
    matches!(value, Value::Array(inner) if inner.first().is_some_and(is_chunk))
}

fn chunks_from_values(values: Vec<Value>) -> Result<Vec<Chunk>, RefineryError> {
    values
        .into_iter()
        .enumerate()
        .map(|(position, value)| {
            if !value.is_object() {
                return Err(RefineryError::invalid_input_with(format!(
                    "element {position} is not a chunk"
                )));
            }
            serde_json::from_value(value).map_err(|error| {
                RefineryError::invalid_input_with(format!("element {position}: {error}"))
            })
        })
        .collect()
}
