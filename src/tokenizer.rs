//! Token counters used by refineries to measure borrowed context.
//!
//! Refineries never tokenize for real; they only need to know how many tokens a span costs.
//! Counters are cheap to clone and shareable across threads:
//!
//! - Whitespace counting needs no resources and is always available.
//! - `tiktoken-rs` counters resolve a model name first, then an encoding name, and finally fall
//!   back to `cl100k_base` so an unknown model still yields a usable budget.

use anyhow::Error as EncodingError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tiktoken_rs::{
    CoreBPE, cl100k_base, get_bpe_from_model, o200k_base, p50k_base, p50k_edit, r50k_base,
};

/// Shared token counting function.
pub type TokenCounter = Arc<dyn Fn(&str) -> usize + Send + Sync>;

/// Errors raised while building a token counter.
#[derive(Debug, Error)]
pub enum TokenizerError {
    /// The BPE encoding could not be loaded.
    #[error("failed to initialize tokenizer for model '{model}': {source}")]
    Encoding {
        /// Model or encoding name we attempted to load.
        model: String,
        /// Underlying error raised by the tokenizer library.
        #[source]
        source: EncodingError,
    },
}

/// Which token counter a refinery should use.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TokenizerChoice {
    /// Count whitespace-separated words.
    #[default]
    Whitespace,
    /// Count BPE tokens for the named model or encoding.
    Tiktoken(String),
}

impl std::str::FromStr for TokenizerChoice {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(());
        }
        match trimmed.to_lowercase().as_str() {
            "whitespace" | "word" | "words" => Ok(Self::Whitespace),
            _ => Ok(Self::Tiktoken(trimmed.to_string())),
        }
    }
}

impl fmt::Display for TokenizerChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Whitespace => f.write_str("whitespace"),
            Self::Tiktoken(model) => f.write_str(model),
        }
    }
}

/// Build the counter described by `choice`.
pub fn build_token_counter(choice: &TokenizerChoice) -> Result<TokenCounter, TokenizerError> {
    match choice {
        TokenizerChoice::Whitespace => Ok(whitespace_counter()),
        TokenizerChoice::Tiktoken(model) => tiktoken_counter(model),
    }
}

/// Counter that treats each whitespace-separated word as one token.
///
/// Non-empty text made only of whitespace still costs one token so that separators are never free.
pub fn whitespace_counter() -> TokenCounter {
    Arc::new(|segment: &str| {
        let tokens = segment.split_whitespace().count();
        if tokens == 0 && !segment.is_empty() {
            1
        } else {
            tokens
        }
    })
}

/// Counter backed by a `tiktoken` BPE encoding.
pub fn tiktoken_counter(model: &str) -> Result<TokenCounter, TokenizerError> {
    let normalized = model.trim();
    let target = if normalized.is_empty() {
        "cl100k_base"
    } else {
        normalized
    };
    let encoding = resolve_encoding(target).map_err(|source| TokenizerError::Encoding {
        model: target.to_string(),
        source,
    })?;
    let encoding = Arc::new(encoding);

    Ok(Arc::new(move |segment: &str| {
        encoding.encode_ordinary(segment).len()
    }))
}

fn resolve_encoding(model: &str) -> Result<CoreBPE, EncodingError> {
    match get_bpe_from_model(model) {
        Ok(encoding) => Ok(encoding),
        Err(model_err) => {
            tracing::debug!(
                model,
                error = %model_err,
                "Tokenizer model lookup failed; trying encoding name"
            );
            if let Some(candidate) = encoding_from_name(model) {
                candidate
            } else {
                tracing::warn!(
                    model,
                    "Falling back to 'cl100k_base' encoding for token counting"
                );
                cl100k_base()
            }
        }
    }
}

fn encoding_from_name(name: &str) -> Option<Result<CoreBPE, EncodingError>> {
    match name {
        "cl100k_base" => Some(cl100k_base()),
        "o200k_base" => Some(o200k_base()),
        "p50k_base" => Some(p50k_base()),
        "p50k_edit" => Some(p50k_edit()),
        "r50k_base" | "gpt2" => Some(r50k_base()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whitespace_counter_counts_words() {
        let counter = whitespace_counter();
        assert_eq!(counter.as_ref()("one two  three"), 3);
        assert_eq!(counter.as_ref()(""), 0);
        assert_eq!(counter.as_ref()("   "), 1);
    }

    #[test]
    fn choice_parses_whitespace_aliases() {
        assert_eq!(
            "Whitespace".parse::<TokenizerChoice>(),
            Ok(TokenizerChoice::Whitespace)
        );
        assert_eq!(
            "words".parse::<TokenizerChoice>(),
            Ok(TokenizerChoice::Whitespace)
        );
        assert!("  ".parse::<TokenizerChoice>().is_err());
    }

    #[test]
    fn choice_keeps_model_names_verbatim() {
        assert_eq!(
            "cl100k_base".parse::<TokenizerChoice>(),
            Ok(TokenizerChoice::Tiktoken("cl100k_base".into()))
        );
    }

    #[test]
    fn tiktoken_counter_counts_bpe_tokens() {
        let counter = tiktoken_counter("cl100k_base").expect("encoding loads");
        assert_eq!(counter.as_ref()(""), 0);
        assert!(counter.as_ref()("The quick brown fox") >= 4);
    }

    #[test]
    fn unknown_model_falls_back_to_default_encoding() {
        let counter = build_token_counter(&TokenizerChoice::Tiktoken("no-such-model".into()))
            .expect("fallback encoding loads");
        assert!(counter.as_ref()("hello world") > 0);
    }
}
