//! Token counting and context-window limits.
//!
//! The [`Tokenizer`] trait is what the rest of the crate budgets against:
//! a token count for arbitrary text, the model's context window and a
//! default output budget. Two implementations ship with the crate:
//!
//! - [`TiktokenTokenizer`]: exact BPE counts for OpenAI-family models.
//! - [`SimpleTokenizer`]: a characters-per-token estimate for backends
//!   without a public tokenizer, and for deterministic tests.
//!
//! The embedding driver and the prompt driver each carry their own
//! tokenizer; they may differ.

use tiktoken_rs::{cl100k_base, o200k_base, CoreBPE};

use crate::error::{RagError, Result};

/// Output budget used when a tokenizer has no model-specific value.
pub const DEFAULT_MAX_OUTPUT_TOKENS: usize = 4096;

/// Counts tokens and exposes the model's context limits.
pub trait Tokenizer: Send + Sync {
    /// Number of tokens `text` occupies.
    fn count_tokens(&self, text: &str) -> usize;

    /// Size of the model's context window, in tokens.
    fn max_tokens(&self) -> usize;

    /// Output budget to request when the caller sets none.
    fn default_max_output_tokens(&self) -> usize {
        DEFAULT_MAX_OUTPUT_TOKENS.min(self.max_tokens())
    }
}

// Ordered most-specific first; the first matching prefix wins.
const MODEL_PREFIXES_TO_MAX_TOKENS: &[(&str, usize)] = &[
    ("gpt-4o", 128_000),
    ("gpt-4.1", 1_047_576),
    ("gpt-4-turbo", 128_000),
    ("gpt-4-32k", 32_768),
    ("gpt-4", 8_192),
    ("gpt-3.5-turbo-16k", 16_385),
    ("gpt-3.5-turbo", 16_385),
    ("o1-mini", 128_000),
    ("o1", 200_000),
    ("o3", 200_000),
    ("text-embedding", 8_191),
];

const FALLBACK_MAX_TOKENS: usize = 4_096;

/// Context window for a model name, by prefix.
pub fn max_tokens_for_model(model: &str) -> usize {
    MODEL_PREFIXES_TO_MAX_TOKENS
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|(_, tokens)| *tokens)
        .unwrap_or(FALLBACK_MAX_TOKENS)
}

const O200K_MODEL_PREFIXES: &[&str] = &["gpt-4o", "gpt-4.1", "o1", "o3", "o4"];

fn uses_o200k(model: &str) -> bool {
    O200K_MODEL_PREFIXES
        .iter()
        .any(|prefix| model.starts_with(prefix))
}

/// BPE tokenizer backed by tiktoken.
pub struct TiktokenTokenizer {
    encoder: CoreBPE,
    model: String,
    max_tokens: usize,
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenTokenizer")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl TiktokenTokenizer {
    /// Create a tokenizer for a specific model.
    ///
    /// Falls back to cl100k_base (GPT-4/3.5 encoding) if the model is unknown.
    pub fn for_model(model: &str) -> Result<Self> {
        let encoder = match model {
            m if uses_o200k(m) => o200k_base(),
            _ => cl100k_base(),
        }
        .map_err(|e| RagError::ConfigError(format!("Failed to load tokenizer: {}", e)))?;

        Ok(Self {
            encoder,
            model: model.to_string(),
            max_tokens: max_tokens_for_model(model),
        })
    }

    /// Override the context window.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Get the model this tokenizer is configured for.
    pub fn model(&self) -> &str {
        &self.model
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        self.encoder.encode_with_special_tokens(text).len()
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }
}

/// Estimates tokens as `ceil(chars / characters_per_token)`.
#[derive(Debug, Clone)]
pub struct SimpleTokenizer {
    characters_per_token: usize,
    max_tokens: usize,
    max_output_tokens: usize,
}

impl SimpleTokenizer {
    /// Create an estimator; `characters_per_token` must be non-zero.
    pub fn new(characters_per_token: usize, max_tokens: usize) -> Result<Self> {
        if characters_per_token == 0 {
            return Err(RagError::ConfigError(
                "characters_per_token must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            characters_per_token,
            max_tokens,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS.min(max_tokens),
        })
    }

    /// Override the default output budget.
    pub fn with_max_output_tokens(mut self, tokens: usize) -> Self {
        self.max_output_tokens = tokens;
        self
    }
}

impl Default for SimpleTokenizer {
    /// Four characters per token with a 4096-token window.
    fn default() -> Self {
        Self {
            characters_per_token: 4,
            max_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }
}

impl Tokenizer for SimpleTokenizer {
    fn count_tokens(&self, text: &str) -> usize {
        let chars = text.chars().count();
        chars.div_ceil(self.characters_per_token)
    }

    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn default_max_output_tokens(&self) -> usize {
        self.max_output_tokens
    }
}
