//! Retrieval-augmented query engine.
//!
//! [`VectorQueryEngine`] answers a query in one of two modes, chosen by the
//! vector store:
//!
//! - **Delegated**: stores that report
//!   [`VectorStore::uses_retrieve_and_generate`] receive the query, a
//!   rendered prompt template and the prior session id, and produce the
//!   answer themselves.
//! - **Local** (default): the engine fetches the nearest text segments,
//!   packs as many as fit the prompt driver's context window, and runs a
//!   system + user prompt.
//!
//! # Token budget
//!
//! Segments are appended in retrieval order and the user message is
//! re-rendered after each one. When
//! `token_count(message) + answer_token_offset >= max_tokens` the segment
//! just added is dropped and packing stops, so a budget hit at segment `k`
//! keeps segments `1..k-1`.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::artifact::TextArtifact;
use crate::config::{QueryConfig, DEFAULT_ANSWER_TOKEN_OFFSET};
use crate::error::{RagError, Result};
use crate::memory::{encode_session_id, ConversationMemory};
use crate::prompt_stack::{PromptInput, PromptStack, Role};
use crate::rules::Ruleset;
use crate::templates::{TemplateRenderer, VECTOR_GENERATE, VECTOR_QUERY, VECTOR_SYSTEM};
use crate::traits::{
    PromptDriver, QueryResult, RetrieveAndGenerateRequest, RetrievedAnswer, VectorStore,
    DEFAULT_QUERY_COUNT,
};

pub const DEFAULT_QUERY_PREAMBLE: &str = "You can answer questions by searching through text segments. Always be truthful. Don't make up facts. Use the below list of text segments to respond to the subsequent query. If the answer cannot be found in the segments, say 'I could not find an answer'.";

/// Per-query parameters.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions<'a> {
    pub namespace: Option<String>,
    pub rulesets: Vec<Ruleset>,
    /// Free-form context rendered above the segments.
    pub metadata: Option<String>,
    /// Results to request from the vector store.
    pub top_n: Option<usize>,
    /// System preamble; [`DEFAULT_QUERY_PREAMBLE`] when absent or empty.
    pub preamble: Option<String>,
    /// Conversation to continue. Only delegated generation reads it.
    pub memory: Option<&'a ConversationMemory>,
}

impl<'a> QueryOptions<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn rulesets(mut self, rulesets: Vec<Ruleset>) -> Self {
        self.rulesets = rulesets;
        self
    }

    pub fn metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn top_n(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }

    pub fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn memory(mut self, memory: &'a ConversationMemory) -> Self {
        self.memory = Some(memory);
        self
    }
}

/// Answer of a query, plus the backend session for delegated generation.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryAnswer {
    pub artifact: TextArtifact,
    pub session_id: Option<String>,
}

impl QueryAnswer {
    pub fn new(artifact: TextArtifact) -> Self {
        Self {
            artifact,
            session_id: None,
        }
    }

    pub fn text(&self) -> &str {
        self.artifact.to_text()
    }

    /// Output as stored in conversation memory.
    pub fn to_protocol_text(&self) -> String {
        match &self.session_id {
            Some(id) => encode_session_id(self.text(), id),
            None => self.text().to_string(),
        }
    }
}

impl From<RetrievedAnswer> for QueryAnswer {
    fn from(answer: RetrievedAnswer) -> Self {
        Self {
            artifact: answer.artifact,
            session_id: answer.session_id,
        }
    }
}

/// Query engine over stored text.
#[async_trait]
pub trait QueryEngine: Send + Sync {
    async fn query(&self, query: &str, options: &QueryOptions<'_>) -> Result<QueryAnswer>;

    async fn upsert_text_artifact(
        &self,
        artifact: &TextArtifact,
        namespace: Option<&str>,
    ) -> Result<String>;

    async fn upsert_text_artifacts(
        &self,
        artifacts: &[TextArtifact],
        namespace: Option<&str>,
    ) -> Result<Vec<String>>;

    /// Stored text artifacts; other artifact kinds are skipped.
    async fn load_artifacts(&self, namespace: Option<&str>) -> Result<Vec<TextArtifact>>;
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`VectorQueryEngine`].
#[derive(Default)]
pub struct VectorQueryEngineBuilder {
    vector_store: Option<Arc<dyn VectorStore>>,
    prompt_driver: Option<Arc<dyn PromptDriver>>,
    answer_token_offset: Option<usize>,
    top_n: Option<usize>,
    preamble: Option<String>,
    templates: Option<TemplateRenderer>,
}

impl VectorQueryEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the vector store (required).
    pub fn vector_store(mut self, vector_store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(vector_store);
        self
    }

    /// Set the prompt driver (required).
    pub fn prompt_driver(mut self, prompt_driver: Arc<dyn PromptDriver>) -> Self {
        self.prompt_driver = Some(prompt_driver);
        self
    }

    /// Tokens reserved for the answer (default 400).
    pub fn answer_token_offset(mut self, offset: usize) -> Self {
        self.answer_token_offset = Some(offset);
        self
    }

    /// Default result count when a query sets none.
    pub fn top_n(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }

    /// Default preamble when a query sets none.
    pub fn preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    /// Replace the template set.
    pub fn templates(mut self, templates: TemplateRenderer) -> Self {
        self.templates = Some(templates);
        self
    }

    /// Apply a `[query]` config section.
    pub fn query_config(mut self, config: &QueryConfig) -> Self {
        self.answer_token_offset = Some(config.answer_token_offset);
        self.top_n = Some(config.top_n);
        if let Some(preamble) = &config.preamble {
            self.preamble = Some(preamble.clone());
        }
        self
    }

    pub fn build(self) -> Result<VectorQueryEngine> {
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let prompt_driver = self
            .prompt_driver
            .ok_or_else(|| RagError::ConfigError("prompt_driver is required".to_string()))?;

        let answer_token_offset = self
            .answer_token_offset
            .unwrap_or(DEFAULT_ANSWER_TOKEN_OFFSET);
        let max_tokens = prompt_driver.tokenizer().max_tokens();
        if answer_token_offset >= max_tokens {
            return Err(RagError::ConfigError(format!(
                "answer_token_offset ({}) must be below the prompt model's max_tokens ({})",
                answer_token_offset, max_tokens
            )));
        }
        if self.top_n == Some(0) {
            return Err(RagError::ConfigError(
                "top_n must be greater than zero".to_string(),
            ));
        }

        Ok(VectorQueryEngine {
            vector_store,
            prompt_driver,
            answer_token_offset,
            top_n: self.top_n,
            preamble: self.preamble,
            templates: self.templates.unwrap_or_default(),
        })
    }
}

// ============================================================================
// Engine
// ============================================================================

/// Query engine backed by a [`VectorStore`] and a [`PromptDriver`].
pub struct VectorQueryEngine {
    vector_store: Arc<dyn VectorStore>,
    prompt_driver: Arc<dyn PromptDriver>,
    answer_token_offset: usize,
    top_n: Option<usize>,
    preamble: Option<String>,
    templates: TemplateRenderer,
}

impl std::fmt::Debug for VectorQueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorQueryEngine")
            .field("vector_store", &self.vector_store.name())
            .field("prompt_driver", &self.prompt_driver.name())
            .field("model", &self.prompt_driver.model())
            .field("answer_token_offset", &self.answer_token_offset)
            .field("top_n", &self.top_n)
            .finish()
    }
}

impl VectorQueryEngine {
    pub fn builder() -> VectorQueryEngineBuilder {
        VectorQueryEngineBuilder::new()
    }

    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    pub fn prompt_driver(&self) -> &Arc<dyn PromptDriver> {
        &self.prompt_driver
    }

    pub fn answer_token_offset(&self) -> usize {
        self.answer_token_offset
    }

    /// Stream the answer of a local query.
    ///
    /// Retrieval and packing happen before the stream is returned; fragments
    /// then arrive as the prompt driver yields them.
    pub async fn stream_query(
        &self,
        query: &str,
        options: &QueryOptions<'_>,
    ) -> Result<BoxStream<'static, Result<TextArtifact>>> {
        if self.vector_store.uses_retrieve_and_generate() {
            return Err(RagError::NotSupported(format!(
                "{} generates answers itself and cannot stream",
                self.vector_store.name()
            )));
        }
        let stack = self.local_prompt_stack(query, options).await?;
        self.prompt_driver.stream(&stack).await
    }

    fn preamble<'o>(&'o self, options: &'o QueryOptions<'_>) -> &'o str {
        non_empty(&options.preamble)
            .or_else(|| non_empty(&self.preamble))
            .unwrap_or(DEFAULT_QUERY_PREAMBLE)
    }

    fn top_n(&self, options: &QueryOptions<'_>) -> Option<usize> {
        options.top_n.or(self.top_n)
    }

    async fn query_delegated(
        &self,
        query: &str,
        options: &QueryOptions<'_>,
    ) -> Result<QueryAnswer> {
        let rulesets = self.templates.render_rulesets(&options.rulesets)?;
        let prompt_template = self.templates.render(
            VECTOR_GENERATE,
            &json!({
                "preamble": self.preamble(options),
                "rulesets": rulesets,
                "appendix": self.prompt_driver.assistant_appendix(),
            }),
        )?;

        let session_id = options.memory.and_then(ConversationMemory::last_session_id);
        if session_id.is_none() {
            debug!("No stored session, starting a new one");
        }

        let answer = self
            .vector_store
            .retrieve_and_generate(RetrieveAndGenerateRequest {
                query,
                count: self.top_n(options),
                namespace: options.namespace.as_deref(),
                prompt_template: &prompt_template,
                model: self.prompt_driver.model(),
                session_id,
            })
            .await?;

        Ok(answer.into())
    }

    async fn local_prompt_stack(
        &self,
        query: &str,
        options: &QueryOptions<'_>,
    ) -> Result<PromptStack> {
        let count = self.top_n(options).unwrap_or(DEFAULT_QUERY_COUNT);
        let results = self
            .vector_store
            .query(query, Some(count), options.namespace.as_deref())
            .await?;

        let artifacts: Vec<TextArtifact> =
            results.iter().filter_map(QueryResult::text_artifact).collect();
        if artifacts.len() < results.len() {
            debug!(
                "Skipped {} results without a text artifact",
                results.len() - artifacts.len()
            );
        }

        let rulesets = self.templates.render_rulesets(&options.rulesets)?;
        let message = self.pack_segments(query, options.metadata.as_deref(), &rulesets, &artifacts)?;
        let system_message = self
            .templates
            .render(VECTOR_SYSTEM, &json!({ "preamble": self.preamble(options) }))?;

        let mut stack = PromptStack::new();
        stack
            .add_system_input(system_message)
            .add_user_input(message);
        Ok(stack)
    }

    /// Render the user message with as many segments as the budget allows.
    fn pack_segments(
        &self,
        query: &str,
        metadata: Option<&str>,
        rulesets: &str,
        artifacts: &[TextArtifact],
    ) -> Result<String> {
        let max_tokens = self.prompt_driver.tokenizer().max_tokens();
        let render = |segments: &[&str]| {
            self.templates.render(
                VECTOR_QUERY,
                &json!({
                    "query": query,
                    "metadata": metadata,
                    "text_segments": segments,
                    "rulesets": rulesets,
                }),
            )
        };

        let mut segments: Vec<&str> = Vec::with_capacity(artifacts.len());
        let mut message = render(&segments)?;

        for artifact in artifacts {
            segments.push(artifact.to_text());
            message = render(&segments)?;

            let stack = PromptStack::from_inputs(vec![PromptInput::new(message.clone(), Role::User)]);
            let token_count = self.prompt_driver.token_count(&stack);

            if token_count + self.answer_token_offset >= max_tokens {
                segments.pop();
                message = render(&segments)?;
                debug!(
                    "Token budget reached at segment {} ({} + {} >= {})",
                    segments.len() + 1,
                    token_count,
                    self.answer_token_offset,
                    max_tokens
                );
                break;
            }
        }

        debug!("Packed {}/{} segments", segments.len(), artifacts.len());
        Ok(message)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[async_trait]
impl QueryEngine for VectorQueryEngine {
    #[instrument(skip(self, query, options), fields(store = %self.vector_store.name(), namespace = ?options.namespace))]
    async fn query(&self, query: &str, options: &QueryOptions<'_>) -> Result<QueryAnswer> {
        if self.vector_store.uses_retrieve_and_generate() {
            info!("Delegating query to {}", self.vector_store.name());
            return self.query_delegated(query, options).await;
        }

        let stack = self.local_prompt_stack(query, options).await?;
        let artifact = self.prompt_driver.run(&stack).await?;
        Ok(QueryAnswer::new(artifact))
    }

    async fn upsert_text_artifact(
        &self,
        artifact: &TextArtifact,
        namespace: Option<&str>,
    ) -> Result<String> {
        self.vector_store
            .upsert_text_artifact(artifact, namespace)
            .await
    }

    async fn upsert_text_artifacts(
        &self,
        artifacts: &[TextArtifact],
        namespace: Option<&str>,
    ) -> Result<Vec<String>> {
        self.vector_store
            .upsert_text_artifacts(artifacts, namespace)
            .await
    }

    async fn load_artifacts(&self, namespace: Option<&str>) -> Result<Vec<TextArtifact>> {
        let entries = self.vector_store.load_entries(namespace).await?;
        Ok(entries.iter().filter_map(|e| e.text_artifact()).collect())
    }
}
