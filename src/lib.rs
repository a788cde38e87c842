#![deny(missing_docs)]

//! Refinement strategies that enrich segmented text chunks with neighbouring context.

/// Environment-driven configuration management.
pub mod config;
/// Structured logging and tracing setup.
pub mod logging;
/// Refinement activity counters.
pub mod metrics;
/// The refinery contract, its dispatch helpers, and concrete strategies.
pub mod refinery;
/// Token counters used to size borrowed context.
pub mod tokenizer;
/// Chunk and context records.
pub mod types;

pub use refinery::{
    Chunks, Detected, OverlapMode, OverlapRefinery, Refinery, RefineryConfig, RefineryDescriptor,
    RefineryError, RefineryPipeline, detect_shape,
};
pub use types::{Chunk, Context};
