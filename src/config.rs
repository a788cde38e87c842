use crate::refinery::OverlapMode;
use crate::tokenizer::TokenizerChoice;
use std::env;
use thiserror::Error;

/// Context size used when `REFINERY_CONTEXT_SIZE` is not set.
pub const DEFAULT_CONTEXT_SIZE: i64 = 128;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable {key}: '{value}'")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Raw value found in the environment.
        value: String,
    },
}

/// Runtime configuration for refineries built from the environment.
///
/// `context_size` stays signed here; refineries validate it when they are constructed so that a
/// negative value surfaces as a configuration error from the refinery itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Raw context size (`REFINERY_CONTEXT_SIZE`).
    pub context_size: i64,
    /// Which neighbour overlap context is borrowed from (`REFINERY_OVERLAP_MODE`).
    pub overlap_mode: OverlapMode,
    /// Whether borrowed context is merged into chunk text (`REFINERY_MERGE_CONTEXT`).
    pub merge_context: bool,
    /// Token counter used to size context (`REFINERY_TOKENIZER`).
    pub tokenizer: TokenizerChoice,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_size: DEFAULT_CONTEXT_SIZE,
            overlap_mode: OverlapMode::default(),
            merge_context: true,
            tokenizer: TokenizerChoice::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        Ok(Self {
            context_size: parse_optional(&lookup, "REFINERY_CONTEXT_SIZE", |value| {
                value.trim().parse().ok()
            })?
            .unwrap_or(defaults.context_size),
            overlap_mode: parse_optional(&lookup, "REFINERY_OVERLAP_MODE", |value| {
                value.parse().ok()
            })?
            .unwrap_or(defaults.overlap_mode),
            merge_context: parse_optional(&lookup, "REFINERY_MERGE_CONTEXT", parse_bool)?
                .unwrap_or(defaults.merge_context),
            tokenizer: parse_optional(&lookup, "REFINERY_TOKENIZER", |value| value.parse().ok())?
                .unwrap_or(defaults.tokenizer),
        })
    }
}

fn parse_optional<L, T, P>(lookup: &L, key: &str, parse: P) -> Result<Option<T>, ConfigError>
where
    L: Fn(&str) -> Option<String>,
    P: Fn(&str) -> Option<T>,
{
    lookup(key)
        .map(|value| {
            parse(&value).ok_or_else(|| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            })
        })
        .transpose()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Read `.env` (if present) and load configuration from the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        context_size = config.context_size,
        overlap_mode = %config.overlap_mode,
        merge_context = config.merge_context,
        tokenizer = %config.tokenizer,
        "Loaded configuration"
    );
    Ok(config)
}
