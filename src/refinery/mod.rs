//! Refineries: post-chunking steps that enrich chunks with derived context.

mod base;
mod dispatch;
mod error;
pub mod overlap;
mod pipeline;

pub use base::{Refinery, RefineryConfig, RefineryDescriptor};
pub use dispatch::{Chunks, Detected, detect_shape};
pub use error::RefineryError;
pub use overlap::{OverlapMode, OverlapRefinery};
pub use pipeline::RefineryPipeline;
