//! Embedding driver: text of any length to one fixed-length vector.
//!
//! Inputs that fit the tokenizer's limit go to the backend in a single call.
//! Longer inputs are chunked with [`TextChunker`], each chunk is embedded in
//! order, and the chunk vectors are averaged with each chunk's character
//! length as its weight before being scaled to unit L2 norm.
//!
//! ```text
//! text ──► fits? ──yes──► try_embed_chunk ──► vector
//!            │
//!            no
//!            ▼
//!     chunk ─► embed each ─► weighted average ─► normalize ─► vector
//! ```

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::artifact::TextArtifact;
use crate::chunker::{Chunk, TextChunker};
use crate::error::{RagError, Result, RetryStrategy};
use crate::retry::RetryExecutor;
use crate::tokenizer::Tokenizer;
use crate::traits::EmbeddingModel;

/// Embeds strings through an [`EmbeddingModel`], chunking oversized input.
#[derive(Clone)]
pub struct EmbeddingDriver {
    model: Arc<dyn EmbeddingModel>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    chunker: Option<TextChunker>,
    retry_strategy: RetryStrategy,
    executor: RetryExecutor,
}

impl std::fmt::Debug for EmbeddingDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingDriver")
            .field("model", &self.model.model())
            .field("dimension", &self.model.dimension())
            .field("chunker", &self.chunker)
            .field("retry_strategy", &self.retry_strategy)
            .finish()
    }
}

impl EmbeddingDriver {
    /// Driver without a tokenizer: every input is sent as-is.
    pub fn new(model: Arc<dyn EmbeddingModel>) -> Self {
        Self {
            model,
            tokenizer: None,
            chunker: None,
            retry_strategy: RetryStrategy::network_backoff(),
            executor: RetryExecutor::new(),
        }
    }

    /// Bound inputs by the tokenizer's `max_tokens`.
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Result<Self> {
        self.chunker = Some(TextChunker::new(tokenizer.clone())?);
        self.tokenizer = Some(tokenizer);
        Ok(self)
    }

    /// Retry policy for each backend call.
    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    pub fn model(&self) -> &str {
        self.model.model()
    }

    pub fn dimension(&self) -> usize {
        self.model.dimension()
    }

    /// Token limit per backend call, when a tokenizer is configured.
    pub fn max_tokens(&self) -> Option<usize> {
        self.chunker.as_ref().map(TextChunker::max_tokens)
    }

    /// Embed a string of any length.
    ///
    /// Input over the tokenizer limit is chunked and the chunk vectors are
    /// averaged and normalized, even when only one chunk results. Oversized
    /// input that is only whitespace yields no chunks and fails with
    /// [`RagError::InvalidRequest`].
    #[instrument(skip(self, text), fields(model = %self.model.model(), chars = text.len()))]
    pub async fn embed_string(&self, text: &str) -> Result<Vec<f32>> {
        if let (Some(tokenizer), Some(chunker)) = (&self.tokenizer, &self.chunker) {
            let token_count = tokenizer.count_tokens(text);
            if token_count > chunker.max_tokens() {
                debug!(
                    "Input of {} tokens exceeds limit of {}, chunking",
                    token_count,
                    chunker.max_tokens()
                );
                return self.embed_long_string(text, chunker).await;
            }
        }

        self.embed_chunk(text).await
    }

    pub async fn embed_text_artifact(&self, artifact: &TextArtifact) -> Result<Vec<f32>> {
        self.embed_string(artifact.to_text()).await
    }

    async fn embed_long_string(&self, text: &str, chunker: &TextChunker) -> Result<Vec<f32>> {
        let chunks = chunker.chunk(text);
        if chunks.is_empty() {
            return Err(RagError::InvalidRequest(
                "text produced no chunks to embed".to_string(),
            ));
        }

        let mut embeddings = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            embeddings.push(self.embed_chunk(&chunk.value).await?);
        }
        debug!("Embedded {} chunks", chunks.len());

        let weights: Vec<usize> = chunks.iter().map(|c: &Chunk| c.length).collect();
        let average = weighted_average(&embeddings, &weights)?;
        normalize(average)
    }

    /// One backend call with retry, validated against the declared dimension.
    pub async fn embed_chunk(&self, chunk: &str) -> Result<Vec<f32>> {
        let embedding = self
            .executor
            .execute("embed chunk", &self.retry_strategy, || {
                self.model.try_embed_chunk(chunk)
            })
            .await?;

        if embedding.is_empty() {
            return Err(RagError::MalformedResponse(format!(
                "{} returned no embedding",
                self.model.name()
            )));
        }
        let dimension = self.model.dimension();
        if embedding.len() != dimension {
            return Err(RagError::MalformedResponse(format!(
                "{} returned embedding of dimension {}, expected {}",
                self.model.name(),
                embedding.len(),
                dimension
            )));
        }
        Ok(embedding)
    }
}

/// Average vectors component-wise, weighting each by `weights[i]`.
pub fn weighted_average(embeddings: &[Vec<f32>], weights: &[usize]) -> Result<Vec<f32>> {
    if embeddings.is_empty() || embeddings.len() != weights.len() {
        return Err(RagError::InvalidRequest(format!(
            "cannot average {} embeddings with {} weights",
            embeddings.len(),
            weights.len()
        )));
    }
    let total: usize = weights.iter().sum();
    if total == 0 {
        return Err(RagError::InvalidRequest(
            "embedding weights sum to zero".to_string(),
        ));
    }

    let dimension = embeddings[0].len();
    let mut sum = vec![0.0f64; dimension];
    for (embedding, &weight) in embeddings.iter().zip(weights) {
        if embedding.len() != dimension {
            return Err(RagError::MalformedResponse(format!(
                "mixed embedding dimensions {} and {}",
                dimension,
                embedding.len()
            )));
        }
        for (acc, value) in sum.iter_mut().zip(embedding) {
            *acc += f64::from(*value) * weight as f64;
        }
    }

    Ok(sum.into_iter().map(|v| (v / total as f64) as f32).collect())
}

/// Scale a vector to unit L2 norm.
pub fn normalize(vector: Vec<f32>) -> Result<Vec<f32>> {
    let norm = vector
        .iter()
        .map(|v| f64::from(*v) * f64::from(*v))
        .sum::<f64>()
        .sqrt();
    if norm == 0.0 || !norm.is_finite() {
        return Err(RagError::MalformedResponse(
            "averaged embedding has zero norm".to_string(),
        ));
    }
    Ok(vector
        .into_iter()
        .map(|v| (f64::from(v) / norm) as f32)
        .collect())
}
