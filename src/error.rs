//! RAG error types with retry strategies.
//!
//! # Error Handling Philosophy
//!
//! Errors fall into three families:
//! 1. **Transient**: network, rate-limit, timeout and server-side failures.
//!    These are retried locally with exponential backoff.
//! 2. **Malformed**: the backend answered but the answer is unusable
//!    (missing field, empty body, wrong dimension). Retrying cannot help.
//! 3. **Configuration**: invalid budgets, missing collaborators, bad config
//!    files. Raised at construction or call time, never retried.
//!
//! # Retry Strategies
//!
//! | Error | Strategy |
//! |-------|----------|
//! | `NetworkError`, `Timeout` | `ExponentialBackoff` (network) |
//! | `RateLimited` | `WaitAndRetry` |
//! | `ProviderError`, 5xx `ApiError` | `ExponentialBackoff` (server) |
//! | `MalformedResponse`, `ConfigError`, `InvalidRequest`, ... | `NoRetry` |

use std::time::Duration;
use thiserror::Error;

/// Result type for RAG operations.
pub type Result<T> = std::result::Result<T, RagError>;

// ============================================================================
// Retry Strategy
// ============================================================================

/// Strategy for retrying a failed backend call.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryStrategy {
    /// Retry with exponential backoff (for transient errors).
    ExponentialBackoff {
        /// Initial delay before first retry.
        base_delay: Duration,
        /// Maximum delay between retries.
        max_delay: Duration,
        /// Maximum number of attempts, including the first one.
        max_attempts: u32,
    },

    /// Wait for a specific duration then retry once (for rate limits).
    WaitAndRetry {
        /// Duration to wait before retrying.
        wait: Duration,
    },

    /// Do not retry at all (permanent error).
    NoRetry,
}

impl RetryStrategy {
    /// Standard exponential backoff for network errors.
    pub fn network_backoff() -> Self {
        Self::ExponentialBackoff {
            base_delay: Duration::from_millis(125),
            max_delay: Duration::from_secs(30),
            max_attempts: 5,
        }
    }

    /// Standard exponential backoff for server errors.
    pub fn server_backoff() -> Self {
        Self::ExponentialBackoff {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 3,
        }
    }

    /// Check if this strategy allows retrying.
    pub fn should_retry(&self) -> bool {
        !matches!(self, Self::NoRetry)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur in embedding, retrieval and generation.
#[derive(Debug, Error)]
pub enum RagError {
    /// API error from a backend.
    #[error("API error: {0}")]
    ApiError(String),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Network error.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Timeout error.
    #[error("Request timed out")]
    Timeout,

    /// Backend-specific transient error.
    #[error("Provider error: {0}")]
    ProviderError(String),

    /// The backend answered with something unusable.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Feature not supported by this backend.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Template lookup or rendering failed.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A retried operation failed on every attempt.
    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<RagError>,
    },
}

impl From<minijinja::Error> for RagError {
    fn from(err: minijinja::Error) -> Self {
        RagError::TemplateError(err.to_string())
    }
}

impl RagError {
    /// Get the appropriate retry strategy for this error.
    ///
    /// ```
    /// use edgequake_rag::{RagError, RetryStrategy};
    ///
    /// let error = RagError::NetworkError("connection reset".to_string());
    /// assert!(error.retry_strategy().should_retry());
    ///
    /// let error = RagError::MalformedResponse("missing embeddings".to_string());
    /// assert_eq!(error.retry_strategy(), RetryStrategy::NoRetry);
    /// ```
    pub fn retry_strategy(&self) -> RetryStrategy {
        match self {
            Self::NetworkError(_) | Self::Timeout => RetryStrategy::network_backoff(),

            Self::RateLimited(_) => RetryStrategy::WaitAndRetry {
                wait: Duration::from_secs(60),
            },

            Self::ApiError(msg)
                if msg.contains("500") || msg.contains("502") || msg.contains("503") =>
            {
                RetryStrategy::server_backoff()
            }
            Self::ProviderError(_) => RetryStrategy::server_backoff(),

            Self::ApiError(_) => RetryStrategy::ExponentialBackoff {
                base_delay: Duration::from_secs(1),
                max_delay: Duration::from_secs(30),
                max_attempts: 2,
            },

            Self::MalformedResponse(_)
            | Self::InvalidRequest(_)
            | Self::ConfigError(_)
            | Self::NotSupported(_)
            | Self::TemplateError(_)
            | Self::SerializationError(_)
            | Self::RetriesExhausted { .. } => RetryStrategy::NoRetry,
        }
    }

    /// Check if this error is transient (can be retried).
    pub fn is_recoverable(&self) -> bool {
        self.retry_strategy().should_retry()
    }

    /// Name of the operation that exhausted its retries, if any.
    pub fn failed_operation(&self) -> Option<&str> {
        match self {
            Self::RetriesExhausted { operation, .. } => Some(operation),
            _ => None,
        }
    }
}
