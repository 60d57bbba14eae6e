//! TOML configuration for the query engine, retry policy and embedding.
//!
//! # Configuration File Location
//!
//! The config file is loaded from (in order of priority):
//! 1. `EDGEQUAKE_RAG_CONFIG` environment variable
//! 2. `./rag.toml` (current working directory)
//! 3. `~/.edgequake/rag.toml` (user config)
//! 4. Built-in default configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [query]
//! answer_token_offset = 400
//! top_n = 5
//!
//! [retry]
//! base_delay_ms = 125
//! max_delay_ms = 30000
//! max_attempts = 5
//!
//! [embedding]
//! model = "text-embedding-3-small"
//! max_tokens = 8191
//! ```
//!
//! Every field is optional; missing values take the defaults shown above.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::error::{RagError, RetryStrategy};
use crate::traits::DEFAULT_QUERY_COUNT;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "EDGEQUAKE_RAG_CONFIG";

/// File name looked up in the working directory and in `~/.edgequake`.
pub const CONFIG_FILE_NAME: &str = "rag.toml";

/// Tokens reserved for the model's answer by default.
pub const DEFAULT_ANSWER_TOKEN_OFFSET: usize = 400;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
pub enum RagConfigError {
    /// Failed to read configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML config: {0}")]
    ParseError(String),

    /// Invalid configuration values.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl From<RagConfigError> for RagError {
    fn from(err: RagConfigError) -> Self {
        RagError::ConfigError(err.to_string())
    }
}

// ============================================================================
// Sections
// ============================================================================

/// `[query]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Tokens kept free for the answer when packing segments.
    pub answer_token_offset: usize,
    /// Results requested from the vector store.
    pub top_n: usize,
    /// System preamble; the engine's default when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preamble: Option<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            answer_token_offset: DEFAULT_ANSWER_TOKEN_OFFSET,
            top_n: DEFAULT_QUERY_COUNT,
            preamble: None,
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Attempts including the first one.
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 125,
            max_delay_ms: 30_000,
            max_attempts: 5,
        }
    }
}

impl RetryConfig {
    /// Exponential backoff with these bounds.
    pub fn strategy(&self) -> RetryStrategy {
        RetryStrategy::ExponentialBackoff {
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            max_attempts: self.max_attempts,
        }
    }
}

/// `[embedding]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub model: String,
    /// Input token limit per backend call.
    pub max_tokens: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model: "text-embedding-3-small".to_string(),
            max_tokens: 8191,
        }
    }
}

// ============================================================================
// Root
// ============================================================================

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub query: QueryConfig,
    pub retry: RetryConfig,
    pub embedding: EmbeddingConfig,
}

impl RagConfig {
    /// Load configuration from the default locations.
    ///
    /// Searches in order:
    /// 1. `EDGEQUAKE_RAG_CONFIG` environment variable
    /// 2. `./rag.toml`
    /// 3. `~/.edgequake/rag.toml`
    /// 4. Built-in defaults
    pub fn load() -> Result<Self, RagConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            if Path::new(&path).exists() {
                tracing::debug!("Loading RAG config from {}", path);
                return Self::from_file(&path);
            }
            tracing::warn!("{} points to missing file {}", CONFIG_ENV_VAR, path);
        }

        let local_path = Path::new(CONFIG_FILE_NAME);
        if local_path.exists() {
            return Self::from_file(local_path);
        }

        if let Some(home) = dirs::home_dir() {
            let user_path = home.join(".edgequake").join(CONFIG_FILE_NAME);
            if user_path.exists() {
                return Self::from_file(&user_path);
            }
        }

        Ok(Self::builtin_defaults())
    }

    /// Load and validate configuration from a specific file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RagConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RagConfigError> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| RagConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string.
    pub fn to_toml(&self) -> Result<String, RagConfigError> {
        toml::to_string_pretty(self).map_err(|e| RagConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), RagConfigError> {
        std::fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    pub fn builtin_defaults() -> Self {
        Self::default()
    }

    pub fn validate(&self) -> Result<(), RagConfigError> {
        if self.query.top_n == 0 {
            return Err(RagConfigError::ValidationError(
                "query.top_n must be greater than zero".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(RagConfigError::ValidationError(
                "retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(RagConfigError::ValidationError(format!(
                "retry.base_delay_ms ({}) exceeds retry.max_delay_ms ({})",
                self.retry.base_delay_ms, self.retry.max_delay_ms
            )));
        }
        if self.embedding.max_tokens == 0 {
            return Err(RagConfigError::ValidationError(
                "embedding.max_tokens must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
