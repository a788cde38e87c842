//! Overlap refinery: borrow text from neighbouring chunks.
//!
//! In `prefix` mode each chunk receives the tail of the chunk before it; in `suffix` mode it
//! receives the head of the chunk after it. The borrowed span is the longest one whose token count
//! stays within `context_size`, and is always recorded on [`Chunk::context`]. With
//! `merge_context` enabled the span is also spliced into the chunk text and offsets.

use super::base::{Refinery, RefineryConfig};
use super::error::RefineryError;
use crate::config::Config;
use crate::tokenizer::{TokenCounter, build_token_counter, whitespace_counter};
use crate::types::{Chunk, Context};
use serde::Serialize;
use std::fmt;

/// Which neighbour an [`OverlapRefinery`] borrows from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OverlapMode {
    /// Prepend the tail of the previous chunk.
    #[default]
    Prefix,
    /// Append the head of the next chunk.
    Suffix,
}

impl std::str::FromStr for OverlapMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "prefix" => Ok(Self::Prefix),
            "suffix" => Ok(Self::Suffix),
            _ => Err(()),
        }
    }
}

impl fmt::Display for OverlapMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prefix => f.write_str("prefix"),
            Self::Suffix => f.write_str("suffix"),
        }
    }
}

/// Attaches up to `context_size` tokens of neighbouring text to each chunk.
#[derive(Clone)]
pub struct OverlapRefinery {
    config: RefineryConfig,
    mode: OverlapMode,
    merge_context: bool,
    token_counter: TokenCounter,
}

impl OverlapRefinery {
    /// Prefix-mode refinery that merges context and counts whitespace tokens.
    pub fn new(context_size: i64) -> Result<Self, RefineryError> {
        Ok(Self::with_config(RefineryConfig::new(context_size)?))
    }

    /// Build from an already validated configuration.
    pub fn with_config(config: RefineryConfig) -> Self {
        Self {
            config,
            mode: OverlapMode::default(),
            merge_context: true,
            token_counter: whitespace_counter(),
        }
    }

    /// Build from process configuration, including its token counter choice.
    pub fn from_config(config: &Config) -> Result<Self, RefineryError> {
        let token_counter = build_token_counter(&config.tokenizer)?;
        Ok(Self::new(config.context_size)?
            .with_mode(config.overlap_mode)
            .with_merge_context(config.merge_context)
            .with_token_counter(token_counter))
    }

    /// Select which neighbour to borrow from.
    pub fn with_mode(mut self, mode: OverlapMode) -> Self {
        self.mode = mode;
        self
    }

    /// Whether borrowed text is spliced into the chunk text in addition to `context`.
    pub fn with_merge_context(mut self, merge_context: bool) -> Self {
        self.merge_context = merge_context;
        self
    }

    /// Replace the token counter used to size borrowed spans.
    pub fn with_token_counter(mut self, token_counter: TokenCounter) -> Self {
        self.token_counter = token_counter;
        self
    }

    /// Configured mode.
    pub fn mode(&self) -> OverlapMode {
        self.mode
    }

    /// Whether context is merged into chunk text.
    pub fn merge_context(&self) -> bool {
        self.merge_context
    }

    fn count(&self, text: &str) -> usize {
        self.token_counter.as_ref()(text)
    }

    /// Tail of `previous` that fits the budget.
    fn prefix_context(&self, previous: &Chunk) -> Option<Context> {
        let tail = tail_with_token_limit(&previous.text, self.context_size(), &self.token_counter);
        if tail.is_empty() {
            return None;
        }
        let skipped = previous.text[..previous.text.len() - tail.len()]
            .chars()
            .count();
        let start_index = previous.start_index + skipped;
        Some(Context {
            text: tail.to_string(),
            token_count: self.count(tail),
            start_index,
            end_index: start_index + tail.chars().count(),
        })
    }

    /// Head of `next` that fits the budget.
    fn suffix_context(&self, next: &Chunk) -> Option<Context> {
        let head = head_with_token_limit(&next.text, self.context_size(), &self.token_counter);
        if head.is_empty() {
            return None;
        }
        Some(Context {
            text: head.to_string(),
            token_count: self.count(head),
            start_index: next.start_index,
            end_index: next.start_index + head.chars().count(),
        })
    }

    fn attach(&self, mut chunk: Chunk, context: Option<Context>) -> Chunk {
        let Some(context) = context else {
            return chunk;
        };
        if self.merge_context {
            match self.mode {
                OverlapMode::Prefix => {
                    chunk.text.insert_str(0, &context.text);
                    chunk.start_index = context.start_index;
                }
                OverlapMode::Suffix => {
                    chunk.text.push_str(&context.text);
                    chunk.end_index = context.end_index;
                }
            }
            chunk.token_count += context.token_count;
        }
        chunk.context = Some(context);
        chunk
    }
}

impl Refinery for OverlapRefinery {
    fn config(&self) -> &RefineryConfig {
        &self.config
    }

    fn refine(&self, chunks: Vec<Chunk>) -> Result<Vec<Chunk>, RefineryError> {
        tracing::debug!(
            chunks = chunks.len(),
            context_size = self.context_size(),
            mode = %self.mode,
            merge_context = self.merge_context,
            "Refining chunks with overlap context"
        );
        if self.context_size() == 0 || chunks.len() < 2 {
            return Ok(chunks);
        }

        let last = chunks.len() - 1;
        let contexts: Vec<Option<Context>> = (0..chunks.len())
            .map(|position| match self.mode {
                OverlapMode::Prefix if position > 0 => self.prefix_context(&chunks[position - 1]),
                OverlapMode::Suffix if position < last => {
                    self.suffix_context(&chunks[position + 1])
                }
                _ => None,
            })
            .collect();

        Ok(chunks
            .into_iter()
            .zip(contexts)
            .map(|(chunk, context)| self.attach(chunk, context))
            .collect())
    }

    fn is_available() -> bool {
        true
    }
}

impl fmt::Debug for OverlapRefinery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlapRefinery")
            .field("context_size", &self.context_size())
            .field("mode", &self.mode)
            .field("merge_context", &self.merge_context)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for OverlapRefinery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.descriptor())
    }
}

/// Longest whitespace-trimmed suffix of `text` within `token_limit` tokens.
fn tail_with_token_limit<'a>(
    text: &'a str,
    token_limit: usize,
    token_counter: &TokenCounter,
) -> &'a str {
    if token_limit == 0 {
        return "";
    }

    let trimmed_text = text.trim_start();
    if token_counter.as_ref()(trimmed_text) <= token_limit {
        return trimmed_text;
    }

    let len = text.len();
    let mut start = 0;

    while start < len {
        let next_start = text[start..]
            .char_indices()
            .nth(1)
            .map(|(offset, _)| start + offset)
            .unwrap_or(len);
        start = next_start;
        let trimmed = text[start..].trim_start();
        if token_counter.as_ref()(trimmed) <= token_limit {
            return trimmed;
        }
    }

    ""
}

/// Longest whitespace-trimmed prefix of `text` within `token_limit` tokens.
fn head_with_token_limit<'a>(
    text: &'a str,
    token_limit: usize,
    token_counter: &TokenCounter,
) -> &'a str {
    if token_limit == 0 {
        return "";
    }

    let trimmed_text = text.trim_end();
    if token_counter.as_ref()(trimmed_text) <= token_limit {
        return trimmed_text;
    }

    let mut end = text.len();

    while end > 0 {
        end = text[..end]
            .char_indices()
            .next_back()
            .map(|(offset, _)| offset)
            .unwrap_or(0);
        let trimmed = text[..end].trim_end();
        if token_counter.as_ref()(trimmed) <= token_limit {
            return trimmed;
        }
    }

    ""
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document() -> Vec<Chunk> {
        vec![
            Chunk::new("one two three", 0, 13, 3),
            Chunk::new(" four five", 13, 23, 2),
            Chunk::new(" six", 23, 27, 1),
        ]
    }

    #[test]
    fn prefix_mode_prepends_tail_of_previous_chunk() {
        let refinery = OverlapRefinery::new(2).unwrap();
        let refined = refinery.refine(document()).unwrap();

        assert_eq!(refined.len(), 3);
        assert_eq!(refined[0], document()[0]);

        let second = &refined[1];
        let context = second.context.as_ref().unwrap();
        assert_eq!(context.text, "two three");
        assert_eq!(context.start_index, 4);
        assert_eq!(context.end_index, 13);
        assert_eq!(context.token_count, 2);
        assert_eq!(second.text, "two three four five");
        assert_eq!(second.start_index, 4);
        assert_eq!(second.end_index, 23);
        assert_eq!(second.token_count, 4);

        let third = &refined[2];
        assert_eq!(third.context.as_ref().unwrap().text, "four five");
        assert_eq!(third.context.as_ref().unwrap().start_index, 14);
        assert_eq!(third.text, "four five six");
    }

    #[test]
    fn suffix_mode_appends_head_of_next_chunk() {
        let refinery = OverlapRefinery::new(1)
            .unwrap()
            .with_mode(OverlapMode::Suffix);
        let refined = refinery.refine(document()).unwrap();

        let first = &refined[0];
        let context = first.context.as_ref().unwrap();
        assert_eq!(context.text, " four");
        assert_eq!(context.start_index, 13);
        assert_eq!(context.end_index, 18);
        assert_eq!(first.text, "one two three four");
        assert_eq!(first.end_index, 18);
        assert_eq!(first.token_count, 4);

        assert_eq!(refined[1].context.as_ref().unwrap().text, " six");
        assert_eq!(refined[2], document()[2]);
    }

    #[test]
    fn unmerged_context_leaves_text_untouched() {
        let refinery = OverlapRefinery::new(1)
            .unwrap()
            .with_merge_context(false);
        let refined = refinery.refine(document()).unwrap();

        assert_eq!(refined[1].text, " four five");
        assert_eq!(refined[1].start_index, 13);
        assert_eq!(refined[1].token_count, 2);
        assert_eq!(refined[1].context.as_ref().unwrap().text, "three");
    }

    #[test]
    fn merged_text_is_the_covered_document_span() {
        let source = "abcdef";
        let chunks = vec![Chunk::new("abc", 0, 3, 1), Chunk::new("def", 3, 6, 1)];
        let span = |chunk: &Chunk| -> String {
            source
                .chars()
                .skip(chunk.start_index)
                .take(chunk.end_index - chunk.start_index)
                .collect()
        };

        let prefixed = OverlapRefinery::new(1)
            .unwrap()
            .refine(chunks.clone())
            .unwrap();
        assert_eq!(prefixed[1].text, "abcdef");
        assert_eq!(prefixed[1].start_index, 0);
        for chunk in &prefixed {
            assert_eq!(chunk.text, span(chunk));
        }

        let suffixed = OverlapRefinery::new(1)
            .unwrap()
            .with_mode(OverlapMode::Suffix)
            .refine(chunks)
            .unwrap();
        assert_eq!(suffixed[0].text, "abcdef");
        assert_eq!(suffixed[0].end_index, 6);
        for chunk in &suffixed {
            assert_eq!(chunk.text, span(chunk));
        }
    }

    #[test]
    fn zero_context_size_is_identity() {
        let refinery = OverlapRefinery::new(0).unwrap();
        assert_eq!(refinery.refine(document()).unwrap(), document());
    }

    #[test]
    fn single_chunk_is_returned_unchanged() {
        let refinery = OverlapRefinery::new(4).unwrap();
        let chunks = vec![Chunk::new("alone", 0, 5, 1)];
        assert_eq!(refinery.refine(chunks.clone()).unwrap(), chunks);
    }

    #[test]
    fn negative_context_size_is_rejected() {
        let error = OverlapRefinery::new(-3).unwrap_err();
        assert!(matches!(error, RefineryError::InvalidConfiguration(_)));
    }

    #[test]
    fn offsets_count_characters() {
        let chunks = vec![Chunk::new("héllo wörld", 0, 11, 2), Chunk::new("next", 11, 15, 1)];
        let refinery = OverlapRefinery::new(1).unwrap();
        let refined = refinery.refine(chunks).unwrap();
        let context = refined[1].context.as_ref().unwrap();
        assert_eq!(context.text, "wörld");
        assert_eq!(context.start_index, 6);
        assert_eq!(context.end_index, 11);
    }

    #[test]
    fn tail_and_head_respect_budget() {
        let counter = whitespace_counter();
        assert_eq!(tail_with_token_limit("a b c d", 2, &counter), "c d");
        assert_eq!(head_with_token_limit("a b c d", 2, &counter), "a b");
        assert_eq!(tail_with_token_limit("a b", 0, &counter), "");
        assert_eq!(head_with_token_limit("  a  ", 1, &counter), "  a");
    }

    #[test]
    fn mode_parses_case_insensitively() {
        assert_eq!("Suffix".parse::<OverlapMode>(), Ok(OverlapMode::Suffix));
        assert!("middle".parse::<OverlapMode>().is_err());
    }

    #[test]
    fn display_matches_descriptor() {
        let refinery = OverlapRefinery::new(7).unwrap();
        assert_eq!(refinery.to_string(), "OverlapRefinery(context_size=7)");
        assert!(OverlapRefinery::is_available());
    }
}
