//! Ordered composition of refineries applied after chunking.

use super::base::{Refinery, RefineryDescriptor};
use super::dispatch::{Chunks, Detected, detect_shape, needs_refining};
use super::error::RefineryError;
use crate::metrics::{MetricsSnapshot, RefineryMetrics};
use crate::types::Chunk;
use futures_util::future::join_all;
use serde_json::Value;
use std::sync::Arc;

/// Runs a fixed list of refineries over each document, in insertion order.
///
/// Build the pipeline once, then share it (behind an `Arc` when refining concurrently). Every
/// stage sees the output of the stage before it; the first failing stage aborts the document.
#[derive(Default)]
pub struct RefineryPipeline {
    stages: Vec<Box<dyn Refinery>>,
    metrics: Arc<RefineryMetrics>,
}

impl RefineryPipeline {
    /// Create an empty pipeline. An empty pipeline returns its input unchanged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a stage, rejecting strategies whose dependencies are missing.
    pub fn add<R>(mut self, refinery: R) -> Result<Self, RefineryError>
    where
        R: Refinery + 'static,
    {
        if !R::is_available() {
            tracing::warn!(refinery = refinery.name(), "Refinery unavailable; not adding stage");
            return Err(RefineryError::Unavailable {
                refinery: refinery.name().to_string(),
            });
        }
        tracing::debug!(stage = %refinery.descriptor(), position = self.stages.len(), "Added stage");
        self.stages.push(Box::new(refinery));
        Ok(self)
    }

    /// Number of stages.
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    /// Whether the pipeline has no stages.
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Descriptors of every stage, in execution order.
    pub fn describe(&self) -> Vec<RefineryDescriptor> {
        self.stages.iter().map(|stage| stage.descriptor()).collect()
    }

    /// Run every stage over one document.
    pub fn refine(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>, RefineryError> {
        let mut current = chunks;
        for stage in &self.stages {
            let input_len = current.len();
            current = match stage.refine(current) {
                Ok(refined) => refined,
                Err(error) => {
                    tracing::debug!(stage = %stage.descriptor(), error = %error, "Stage failed");
                    self.metrics.record_failure();
                    return Err(error);
                }
            };
            if current.len() != input_len {
                tracing::warn!(
                    stage = %stage.descriptor(),
                    input = input_len,
                    output = current.len(),
                    "Stage changed the number of chunks"
                );
            }
        }
        self.metrics.record_document(current.len() as u64);
        Ok(current)
    }

    /// Run the pipeline over each document in turn, stopping at the first failure.
    pub fn refine_batch(&self, batch: Vec<Vec<Chunk>>) -> Result<Vec<Vec<Chunk>>, RefineryError> {
        tracing::debug!(documents = batch.len(), stages = self.len(), "Refining batch");
        batch.into_iter().map(|chunks| self.refine(chunks)).collect()
    }

    /// Refine documents in parallel on the blocking thread pool.
    ///
    /// Results keep the order of `batch`. When several documents fail, the error of the earliest
    /// one (by position) is returned and no results are.
    pub async fn refine_batch_concurrent(
        self: Arc<Self>,
        batch: Vec<Vec<Chunk>>,
    ) -> Result<Vec<Vec<Chunk>>, RefineryError> {
        tracing::debug!(
            documents = batch.len(),
            stages = self.len(),
            "Refining batch concurrently"
        );
        let handles = batch.into_iter().map(|chunks| {
            let pipeline = Arc::clone(&self);
            tokio::task::spawn_blocking(move || pipeline.refine(chunks))
        });

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined
                    .map_err(|error| RefineryError::Strategy {
                        refinery: "RefineryPipeline".to_string(),
                        reason: format!("refinement task did not complete: {error}"),
                    })
                    .and_then(|refined| refined)
            })
            .collect()
    }

    /// Run the pipeline over either shape, with the same edge cases as [`Refinery::invoke`].
    pub fn invoke(&self, chunks: Chunks) -> Result<Chunks, RefineryError> {
        if !needs_refining(&chunks)? {
            return Ok(chunks);
        }
        match chunks {
            Chunks::Single(chunks) => self.refine(chunks).map(Chunks::Single),
            Chunks::Batch(batch) => self.refine_batch(batch).map(Chunks::Batch),
        }
    }

    /// Like [`RefineryPipeline::invoke`], but batches go through
    /// [`RefineryPipeline::refine_batch_concurrent`].
    pub async fn invoke_concurrent(
        self: Arc<Self>,
        chunks: Chunks,
    ) -> Result<Chunks, RefineryError> {
        if !needs_refining(&chunks)? {
            return Ok(chunks);
        }
        match chunks {
            Chunks::Batch(batch) => self.refine_batch_concurrent(batch).await.map(Chunks::Batch),
            single => self.invoke(single),
        }
    }

    /// Detect the shape of untyped JSON and refine it.
    ///
    /// Values that are not chunk sequences come back as [`Detected::PassThrough`]. With
    /// `concurrent` set, batch documents are refined in parallel.
    pub async fn refine_json(
        self: Arc<Self>,
        input: Value,
        concurrent: bool,
    ) -> Result<Detected, RefineryError> {
        let chunks = match detect_shape(input)? {
            Detected::Chunks(chunks) => chunks,
            passed => return Ok(passed),
        };
        let refined = if concurrent {
            self.invoke_concurrent(chunks).await?
        } else {
            self.invoke(chunks)?
        };
        Ok(Detected::Chunks(refined))
    }

    /// Counters for documents refined through this pipeline.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refinery::base::RefineryConfig;

    struct Append {
        config: RefineryConfig,
        suffix: &'static str,
    }

    impl Append {
        fn new(suffix: &'static str) -> Self {
            Self {
                config: RefineryConfig::default(),
                suffix,
            }
        }
    }

    impl Refinery for Append {
        fn config(&self) -> &RefineryConfig {
            &self.config
        }

        fn refine(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>, RefineryError> {
            Ok(chunks
                .into_iter()
                .map(|mut chunk| {
                    chunk.text.push_str(self.suffix);
                    chunk
                })
                .collect())
        }

        fn is_available() -> bool {
            true
        }
    }

    struct Missing(RefineryConfig);

    impl Refinery for Missing {
        fn config(&self) -> &RefineryConfig {
            &self.0
        }

        fn refine(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>, RefineryError> {
            Ok(chunks)
        }

        fn is_available() -> bool {
            false
        }
    }

    #[test]
    fn stages_run_in_insertion_order() {
        let pipeline = RefineryPipeline::new()
            .add(Append::new("-a"))
            .unwrap()
            .add(Append::new("-b"))
            .unwrap();
        let refined = pipeline.refine(vec![Chunk::new("x", 0, 1, 1)]).unwrap();
        assert_eq!(refined[0].text, "x-a-b");
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let pipeline = RefineryPipeline::new();
        let chunks = vec![Chunk::new("x", 0, 1, 1)];
        assert!(pipeline.is_empty());
        assert_eq!(pipeline.refine(chunks.clone()).unwrap(), chunks);
    }

    #[test]
    fn unavailable_stage_is_rejected() {
        let error = RefineryPipeline::new()
            .add(Missing(RefineryConfig::default()))
            .err()
            .unwrap();
        assert!(matches!(
            error,
            RefineryError::Unavailable { ref refinery } if refinery == "Missing"
        ));
    }

    #[test]
    fn describe_lists_stage_descriptors() {
        let pipeline = RefineryPipeline::new().add(Append::new("!")).unwrap();
        let names: Vec<String> = pipeline
            .describe()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names, vec!["Append(context_size=0)"]);
    }

    #[test]
    fn invoke_keeps_shape_and_edge_cases() {
        let pipeline = RefineryPipeline::new().add(Append::new("!")).unwrap();
        assert_eq!(
            pipeline
                .invoke(Chunks::Single(vec![Chunk::new("x", 0, 1, 1)]))
                .unwrap(),
            Chunks::Single(vec![Chunk::new("x!", 0, 1, 1)])
        );
        assert_eq!(
            pipeline.invoke(Chunks::Batch(Vec::new())).unwrap(),
            Chunks::Batch(Vec::new())
        );
        let error = pipeline
            .invoke(Chunks::Batch(vec![Vec::new(), vec![Chunk::new("x", 0, 1, 1)]]))
            .unwrap_err();
        assert!(matches!(error, RefineryError::InvalidInput(_)));
        assert_eq!(pipeline.metrics_snapshot().documents_refined, 1);
    }

    #[test]
    fn metrics_count_refined_documents() {
        let pipeline = RefineryPipeline::new().add(Append::new("!")).unwrap();
        pipeline
            .refine_batch(vec![
                vec![Chunk::new("a", 0, 1, 1)],
                vec![Chunk::new("b", 0, 1, 1), Chunk::new("c", 1, 2, 1)],
            ])
            .unwrap();
        let snapshot = pipeline.metrics_snapshot();
        assert_eq!(snapshot.documents_refined, 2);
        assert_eq!(snapshot.chunks_refined, 3);
        assert_eq!(snapshot.failures, 0);
    }
}
