//! Collaborator traits for embedding, retrieval and generation.
//!
//! # Key Traits
//!
//! - [`EmbeddingModel`]: one backend call turning a chunk of text into a vector
//! - [`VectorStore`]: vector persistence, nearest-neighbor queries and,
//!   for some backends, server-side retrieve-and-generate
//! - [`PromptDriver`]: sends a [`PromptStack`] to a language model
//!
//! Vendor integrations implement these traits; the crate ships an in-memory
//! [`crate::drivers::LocalVectorStore`] and deterministic mocks in
//! [`crate::drivers::mock`].

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::artifact::{Artifact, TextArtifact, ARTIFACT_METADATA_KEY};
use crate::error::{RagError, Result, RetryStrategy};
use crate::memory::encode_session_id;
use crate::prompt_stack::PromptStack;
use crate::retry::RetryExecutor;
use crate::tokenizer::Tokenizer;

/// Number of results a vector query returns when the caller sets none.
pub const DEFAULT_QUERY_COUNT: usize = 5;

// ============================================================================
// Embedding
// ============================================================================

/// A single embedding backend.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Get the name of this backend.
    fn name(&self) -> &str;

    /// Get the embedding model.
    fn model(&self) -> &str;

    /// Dimension of the vectors this model produces.
    fn dimension(&self) -> usize;

    /// Embed one chunk that is known to fit the model's input limit.
    async fn try_embed_chunk(&self, chunk: &str) -> Result<Vec<f32>>;
}

// ============================================================================
// Vector Store
// ============================================================================

/// One hit from a vector query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    pub id: Option<String>,
    pub score: f32,
    pub vector: Option<Vec<f32>>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl QueryResult {
    /// Result carrying a serialized text artifact, as knowledge-base style
    /// backends return them.
    pub fn from_text(score: f32, artifact: &TextArtifact) -> Result<Self> {
        let mut metadata = HashMap::new();
        metadata.insert(ARTIFACT_METADATA_KEY.to_string(), artifact.to_json()?);
        Ok(Self {
            id: Some(artifact.id.clone()),
            score,
            vector: None,
            namespace: None,
            metadata,
        })
    }

    /// The text artifact stored with this hit, if there is one.
    ///
    /// Missing metadata, unparsable JSON and non-text artifacts all yield
    /// `None`.
    pub fn text_artifact(&self) -> Option<TextArtifact> {
        let json = self.metadata.get(ARTIFACT_METADATA_KEY)?;
        Artifact::from_json(json).ok()?.into_text()
    }
}

/// A stored vector and its metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub vector: Vec<f32>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl VectorEntry {
    pub fn text_artifact(&self) -> Option<TextArtifact> {
        let json = self.metadata.get(ARTIFACT_METADATA_KEY)?;
        Artifact::from_json(json).ok()?.into_text()
    }
}

/// Arguments of a delegated retrieve-and-generate call.
#[derive(Debug, Clone, Copy)]
pub struct RetrieveAndGenerateRequest<'a> {
    pub query: &'a str,
    pub count: Option<usize>,
    pub namespace: Option<&'a str>,
    /// Rendered prompt template for the backend's generation step.
    pub prompt_template: &'a str,
    pub model: &'a str,
    /// Session to continue, from the previous delegated answer.
    pub session_id: Option<&'a str>,
}

/// Answer of a delegated retrieve-and-generate call.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedAnswer {
    pub artifact: TextArtifact,
    /// Backend session to pass on the next call.
    pub session_id: Option<String>,
}

impl RetrievedAnswer {
    pub fn new(artifact: TextArtifact, session_id: Option<String>) -> Self {
        Self {
            artifact,
            session_id,
        }
    }

    /// Answer text as kept in conversation memory: `"<answer><SID><id>"`
    /// when a session id is present, the bare answer otherwise.
    pub fn to_protocol_text(&self) -> String {
        match &self.session_id {
            Some(id) => encode_session_id(&self.artifact.value, id),
            None => self.artifact.value.clone(),
        }
    }
}

/// Vector persistence and nearest-neighbor search.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Get the name of this store.
    fn name(&self) -> &str;

    /// Nearest neighbors of `query`, best first. `count` defaults to
    /// [`DEFAULT_QUERY_COUNT`].
    async fn query(
        &self,
        query: &str,
        count: Option<usize>,
        namespace: Option<&str>,
    ) -> Result<Vec<QueryResult>>;

    /// Insert or replace a vector; returns its id.
    async fn upsert_vector(
        &self,
        vector: Vec<f32>,
        vector_id: Option<String>,
        namespace: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<String>;

    /// Embed and store a text artifact; returns the vector id.
    async fn upsert_text_artifact(
        &self,
        _artifact: &TextArtifact,
        _namespace: Option<&str>,
    ) -> Result<String> {
        Err(RagError::NotSupported(format!(
            "{} does not support text upserts",
            self.name()
        )))
    }

    /// Store several text artifacts in order.
    async fn upsert_text_artifacts(
        &self,
        artifacts: &[TextArtifact],
        namespace: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            ids.push(self.upsert_text_artifact(artifact, namespace).await?);
        }
        Ok(ids)
    }

    async fn load_entry(
        &self,
        vector_id: &str,
        namespace: Option<&str>,
    ) -> Result<Option<VectorEntry>>;

    /// All entries, optionally restricted to one namespace.
    async fn load_entries(&self, namespace: Option<&str>) -> Result<Vec<VectorEntry>>;

    /// Delete an entry; `None` removes the id from every namespace.
    async fn delete_vector(&self, vector_id: &str, namespace: Option<&str>) -> Result<()>;

    /// Whether queries should be delegated to [`VectorStore::retrieve_and_generate`].
    fn uses_retrieve_and_generate(&self) -> bool {
        false
    }

    /// Retrieve context and generate an answer server-side.
    async fn retrieve_and_generate(
        &self,
        _request: RetrieveAndGenerateRequest<'_>,
    ) -> Result<RetrievedAnswer> {
        Err(RagError::NotSupported(format!(
            "{} does not support retrieve-and-generate",
            self.name()
        )))
    }
}

// ============================================================================
// Prompt Driver
// ============================================================================

/// Sends prompt stacks to a language model.
#[async_trait]
pub trait PromptDriver: Send + Sync {
    /// Get the name of this driver.
    fn name(&self) -> &str;

    /// Get the current model.
    fn model(&self) -> &str;

    /// Tokenizer matching the model's context window.
    fn tokenizer(&self) -> &dyn Tokenizer;

    /// Text appended as a trailing assistant turn, for backends that
    /// support prefilling the answer.
    fn assistant_appendix(&self) -> Option<&str> {
        None
    }

    /// Retry policy for [`PromptDriver::run`] and [`PromptDriver::stream`].
    fn retry_strategy(&self) -> RetryStrategy {
        RetryStrategy::network_backoff()
    }

    /// One generation call, no retry.
    async fn try_run(&self, prompt_stack: &PromptStack) -> Result<TextArtifact>;

    /// Open a streamed generation, no retry.
    async fn try_stream(
        &self,
        _prompt_stack: &PromptStack,
    ) -> Result<BoxStream<'static, Result<TextArtifact>>> {
        Err(RagError::NotSupported(format!(
            "{} does not support streaming",
            self.name()
        )))
    }

    /// Token count of a stack as this driver's model sees it.
    fn token_count(&self, prompt_stack: &PromptStack) -> usize {
        self.tokenizer()
            .count_tokens(&prompt_stack.to_prompt_string())
    }

    /// Generate with retry.
    async fn run(&self, prompt_stack: &PromptStack) -> Result<TextArtifact> {
        RetryExecutor::new()
            .execute("prompt run", &self.retry_strategy(), || {
                self.try_run(prompt_stack)
            })
            .await
    }

    /// Stream with retry on opening the stream. Fragments arrive in order;
    /// dropping the stream abandons the generation.
    async fn stream(
        &self,
        prompt_stack: &PromptStack,
    ) -> Result<BoxStream<'static, Result<TextArtifact>>> {
        RetryExecutor::new()
            .execute("prompt stream", &self.retry_strategy(), || {
                self.try_stream(prompt_stack)
            })
            .await
    }
}
