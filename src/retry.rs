//! Retry executor for backend calls with exponential backoff.
//!
//! Every embedding, retrieval and generation call goes through
//! [`RetryExecutor::execute`], a bounded-retry combinator: it takes an
//! operation name, a [`RetryStrategy`] and an async closure, and returns
//! either the closure's value or a terminal error.
//!
//! # Usage
//!
//! ```ignore
//! use edgequake_rag::retry::RetryExecutor;
//! use edgequake_rag::error::RetryStrategy;
//!
//! let executor = RetryExecutor::new();
//! let vector = executor
//!     .execute("embed chunk", &RetryStrategy::network_backoff(), || async {
//!         model.try_embed_chunk(text).await
//!     })
//!     .await?;
//! ```
//!
//! Errors whose own strategy is [`RetryStrategy::NoRetry`] (malformed
//! responses, configuration errors) are returned immediately and unchanged.
//! Transient errors that survive every attempt are wrapped in
//! [`RagError::RetriesExhausted`] naming the operation.

use crate::error::{RagError, RetryStrategy};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Executor for retry logic with configurable backoff strategies.
#[derive(Debug, Default, Clone)]
pub struct RetryExecutor {
    log_retries: bool,
}

impl RetryExecutor {
    /// Create a new retry executor.
    pub fn new() -> Self {
        Self { log_retries: true }
    }

    /// Create a retry executor without logging.
    pub fn silent() -> Self {
        Self { log_retries: false }
    }

    /// Execute an async operation with automatic retry based on strategy.
    ///
    /// # Arguments
    ///
    /// * `operation_name` - Name reported in the terminal error
    /// * `strategy` - The retry strategy to use
    /// * `operation` - Async closure that performs the call
    pub async fn execute<F, Fut, T>(
        &self,
        operation_name: &str,
        strategy: &RetryStrategy,
        mut operation: F,
    ) -> Result<T, RagError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RagError>>,
    {
        match strategy {
            RetryStrategy::NoRetry => operation().await,

            RetryStrategy::WaitAndRetry { wait } => {
                self.execute_wait_and_retry(operation_name, *wait, operation)
                    .await
            }

            RetryStrategy::ExponentialBackoff {
                base_delay,
                max_delay,
                max_attempts,
            } => {
                self.execute_exponential_backoff(
                    operation_name,
                    *base_delay,
                    *max_delay,
                    *max_attempts,
                    operation,
                )
                .await
            }
        }
    }

    async fn execute_wait_and_retry<F, Fut, T>(
        &self,
        operation_name: &str,
        wait: Duration,
        mut operation: F,
    ) -> Result<T, RagError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RagError>>,
    {
        match operation().await {
            Ok(v) => Ok(v),
            Err(e) if !e.is_recoverable() => Err(e),
            Err(e) => {
                if self.log_retries {
                    warn!(
                        "{} failed, waiting {:?} before retry: {}",
                        operation_name, wait, e
                    );
                }
                sleep(wait).await;
                operation().await.map_err(|e| {
                    if e.is_recoverable() {
                        exhausted(operation_name, 2, e)
                    } else {
                        e
                    }
                })
            }
        }
    }

    async fn execute_exponential_backoff<F, Fut, T>(
        &self,
        operation_name: &str,
        base_delay: Duration,
        max_delay: Duration,
        max_attempts: u32,
        mut operation: F,
    ) -> Result<T, RagError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RagError>>,
    {
        let max_attempts = max_attempts.max(1);
        let mut delay = base_delay;
        let mut attempts = 0;

        loop {
            attempts += 1;

            match operation().await {
                Ok(v) => {
                    if attempts > 1 && self.log_retries {
                        info!("{} succeeded after {} attempts", operation_name, attempts);
                    }
                    return Ok(v);
                }
                Err(e) => {
                    if !e.is_recoverable() {
                        if self.log_retries {
                            debug!("{} hit a non-retryable error: {}", operation_name, e);
                        }
                        return Err(e);
                    }

                    if attempts >= max_attempts {
                        if self.log_retries {
                            warn!(
                                "{} failed after {} attempts, giving up: {}",
                                operation_name, attempts, e
                            );
                        }
                        return Err(exhausted(operation_name, attempts, e));
                    }

                    if self.log_retries {
                        warn!(
                            "{} attempt {}/{} failed, retrying in {:?}: {}",
                            operation_name, attempts, max_attempts, delay, e
                        );
                    }

                    sleep(delay).await;
                    delay = (delay * 2).min(max_delay);
                }
            }
        }
    }
}

fn exhausted(operation_name: &str, attempts: u32, source: RagError) -> RagError {
    match source {
        // A nested exhaustion already names the failing operation.
        err @ RagError::RetriesExhausted { .. } => err,
        other => RagError::RetriesExhausted {
            operation: operation_name.to_string(),
            attempts,
            source: Box::new(other),
        },
    }
}
