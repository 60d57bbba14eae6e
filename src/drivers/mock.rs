//! Deterministic collaborators for tests.
//!
//! - [`MockEmbeddingModel`]: queued or per-text vectors, queued failures
//! - [`MockPromptDriver`]: queued answers, records every prompt stack
//! - [`MockVectorStore`]: canned query results, optional delegated
//!   retrieve-and-generate with recorded requests
//!
//! All mocks are cheap to clone; clones share state, so a test can keep a
//! handle while the engine owns another.

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::artifact::{TextArtifact, ARTIFACT_METADATA_KEY};
use crate::error::{RagError, Result, RetryStrategy};
use crate::prompt_stack::PromptStack;
use crate::tokenizer::{SimpleTokenizer, Tokenizer};
use crate::traits::{
    EmbeddingModel, PromptDriver, QueryResult, RetrieveAndGenerateRequest, RetrievedAnswer,
    VectorEntry, VectorStore, DEFAULT_QUERY_COUNT,
};

// ============================================================================
// MockEmbeddingModel
// ============================================================================

/// Mock embedding backend.
///
/// Lookup order per call: queued failure, vector registered for the exact
/// text, queued vector, then `[0.1; dimension]`.
#[derive(Debug, Clone)]
pub struct MockEmbeddingModel {
    dimension: usize,
    embeddings: Arc<Mutex<Vec<Vec<f32>>>>,
    by_text: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    failures: Arc<Mutex<Vec<RagError>>>,
    inputs: Arc<Mutex<Vec<String>>>,
    call_count: Arc<AtomicUsize>,
}

impl MockEmbeddingModel {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            embeddings: Arc::new(Mutex::new(Vec::new())),
            by_text: Arc::new(Mutex::new(HashMap::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
            inputs: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add an embedding to the queue.
    pub async fn add_embedding(&self, embedding: Vec<f32>) {
        self.embeddings.lock().await.push(embedding);
    }

    /// Always answer `text` with `embedding`.
    pub async fn add_embedding_for(&self, text: impl Into<String>, embedding: Vec<f32>) {
        self.by_text.lock().await.insert(text.into(), embedding);
    }

    /// Fail the next call with `error`.
    pub async fn add_failure(&self, error: RagError) {
        self.failures.lock().await.push(error);
    }

    /// Number of backend calls made, failed ones included.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Texts received, in call order.
    pub async fn inputs(&self) -> Vec<String> {
        self.inputs.lock().await.clone()
    }
}

#[async_trait]
impl EmbeddingModel for MockEmbeddingModel {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn try_embed_chunk(&self, chunk: &str) -> Result<Vec<f32>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().await.push(chunk.to_string());

        {
            let mut failures = self.failures.lock().await;
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        if let Some(embedding) = self.by_text.lock().await.get(chunk) {
            return Ok(embedding.clone());
        }

        let mut embeddings = self.embeddings.lock().await;
        if embeddings.is_empty() {
            Ok(vec![0.1; self.dimension])
        } else {
            Ok(embeddings.remove(0))
        }
    }
}

// ============================================================================
// MockPromptDriver
// ============================================================================

/// Mock prompt driver with queue-based answers.
///
/// Every stack passed to `try_run`/`try_stream` is recorded. Streams yield
/// the next answer split after each space.
#[derive(Clone)]
pub struct MockPromptDriver {
    responses: Arc<Mutex<Vec<String>>>,
    failures: Arc<Mutex<Vec<RagError>>>,
    stacks: Arc<Mutex<Vec<PromptStack>>>,
    call_count: Arc<AtomicUsize>,
    tokenizer: Arc<dyn Tokenizer>,
    model_name: String,
    assistant_appendix: Option<String>,
    retry_strategy: RetryStrategy,
}

impl std::fmt::Debug for MockPromptDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPromptDriver")
            .field("model_name", &self.model_name)
            .field("max_tokens", &self.tokenizer.max_tokens())
            .field("assistant_appendix", &self.assistant_appendix)
            .finish()
    }
}

impl Default for MockPromptDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPromptDriver {
    /// Mock using [`SimpleTokenizer::default`].
    pub fn new() -> Self {
        Self::with_tokenizer(Arc::new(SimpleTokenizer::default()))
    }

    pub fn with_tokenizer(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(Vec::new())),
            stacks: Arc::new(Mutex::new(Vec::new())),
            call_count: Arc::new(AtomicUsize::new(0)),
            tokenizer,
            model_name: "mock-model".to_string(),
            assistant_appendix: None,
            retry_strategy: RetryStrategy::NoRetry,
        }
    }

    pub fn with_model(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_assistant_appendix(mut self, appendix: impl Into<String>) -> Self {
        self.assistant_appendix = Some(appendix.into());
        self
    }

    pub fn with_retry_strategy(mut self, strategy: RetryStrategy) -> Self {
        self.retry_strategy = strategy;
        self
    }

    /// Add a response to the queue.
    pub async fn add_response(&self, response: impl Into<String>) {
        self.responses.lock().await.push(response.into());
    }

    /// Fail the next call with `error`.
    pub async fn add_failure(&self, error: RagError) {
        self.failures.lock().await.push(error);
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Stacks received, in call order.
    pub async fn stacks(&self) -> Vec<PromptStack> {
        self.stacks.lock().await.clone()
    }

    pub async fn last_stack(&self) -> Option<PromptStack> {
        self.stacks.lock().await.last().cloned()
    }

    async fn next_response(&self, prompt_stack: &PromptStack) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.stacks.lock().await.push(prompt_stack.clone());

        {
            let mut failures = self.failures.lock().await;
            if !failures.is_empty() {
                return Err(failures.remove(0));
            }
        }

        let mut responses = self.responses.lock().await;
        Ok(if responses.is_empty() {
            "Mock response".to_string()
        } else {
            responses.remove(0)
        })
    }
}

#[async_trait]
impl PromptDriver for MockPromptDriver {
    fn name(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model_name
    }

    fn tokenizer(&self) -> &dyn Tokenizer {
        self.tokenizer.as_ref()
    }

    fn assistant_appendix(&self) -> Option<&str> {
        self.assistant_appendix.as_deref()
    }

    fn retry_strategy(&self) -> RetryStrategy {
        self.retry_strategy.clone()
    }

    async fn try_run(&self, prompt_stack: &PromptStack) -> Result<TextArtifact> {
        Ok(TextArtifact::new(self.next_response(prompt_stack).await?))
    }

    async fn try_stream(
        &self,
        prompt_stack: &PromptStack,
    ) -> Result<BoxStream<'static, Result<TextArtifact>>> {
        let response = self.next_response(prompt_stack).await?;
        let fragments: Vec<Result<TextArtifact>> = response
            .split_inclusive(' ')
            .map(|fragment| Ok(TextArtifact::new(fragment)))
            .collect();
        Ok(futures::stream::iter(fragments).boxed())
    }
}

// ============================================================================
// MockVectorStore
// ============================================================================

/// A query as the mock store received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub query: String,
    pub count: Option<usize>,
    pub namespace: Option<String>,
}

/// A retrieve-and-generate request as the mock store received it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRagRequest {
    pub query: String,
    pub count: Option<usize>,
    pub namespace: Option<String>,
    pub prompt_template: String,
    pub model: String,
    pub session_id: Option<String>,
}

/// Mock vector store returning canned results in insertion order.
#[derive(Debug, Clone, Default)]
pub struct MockVectorStore {
    results: Arc<Mutex<Vec<QueryResult>>>,
    entries: Arc<Mutex<Vec<VectorEntry>>>,
    queries: Arc<Mutex<Vec<RecordedQuery>>>,
    retrieve_and_generate: bool,
    answers: Arc<Mutex<Vec<RetrievedAnswer>>>,
    rag_requests: Arc<Mutex<Vec<RecordedRagRequest>>>,
}

impl MockVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that delegates generation; answers come from
    /// [`MockVectorStore::add_answer`].
    pub fn with_retrieve_and_generate() -> Self {
        Self {
            retrieve_and_generate: true,
            ..Self::default()
        }
    }

    /// Add a canned query result.
    pub async fn add_result(&self, result: QueryResult) {
        self.results.lock().await.push(result);
    }

    /// Add a canned result carrying a text segment.
    pub async fn add_text_result(&self, score: f32, text: impl Into<String>) -> Result<()> {
        let result = QueryResult::from_text(score, &TextArtifact::new(text))?;
        self.add_result(result).await;
        Ok(())
    }

    /// Queue a delegated answer.
    pub async fn add_answer(&self, answer: RetrievedAnswer) {
        self.answers.lock().await.push(answer);
    }

    pub async fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().await.clone()
    }

    pub async fn rag_requests(&self) -> Vec<RecordedRagRequest> {
        self.rag_requests.lock().await.clone()
    }
}

#[async_trait]
impl VectorStore for MockVectorStore {
    fn name(&self) -> &str {
        "mock"
    }

    async fn query(
        &self,
        query: &str,
        count: Option<usize>,
        namespace: Option<&str>,
    ) -> Result<Vec<QueryResult>> {
        self.queries.lock().await.push(RecordedQuery {
            query: query.to_string(),
            count,
            namespace: namespace.map(str::to_string),
        });
        let results = self.results.lock().await;
        Ok(results
            .iter()
            .take(count.unwrap_or(DEFAULT_QUERY_COUNT))
            .cloned()
            .collect())
    }

    async fn upsert_vector(
        &self,
        vector: Vec<f32>,
        vector_id: Option<String>,
        namespace: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        let id = vector_id.unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let mut entries = self.entries.lock().await;
        entries.retain(|e| !(e.id == id && e.namespace.as_deref() == namespace));
        entries.push(VectorEntry {
            id: id.clone(),
            vector,
            namespace: namespace.map(str::to_string),
            metadata,
        });
        Ok(id)
    }

    async fn upsert_text_artifact(
        &self,
        artifact: &TextArtifact,
        namespace: Option<&str>,
    ) -> Result<String> {
        let mut metadata = HashMap::new();
        metadata.insert(ARTIFACT_METADATA_KEY.to_string(), artifact.to_json()?);
        self.upsert_vector(Vec::new(), Some(artifact.id.clone()), namespace, metadata)
            .await
    }

    async fn load_entry(
        &self,
        vector_id: &str,
        namespace: Option<&str>,
    ) -> Result<Option<VectorEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .find(|e| {
                e.id == vector_id && (namespace.is_none() || e.namespace.as_deref() == namespace)
            })
            .cloned())
    }

    async fn load_entries(&self, namespace: Option<&str>) -> Result<Vec<VectorEntry>> {
        let entries = self.entries.lock().await;
        Ok(entries
            .iter()
            .filter(|e| namespace.is_none() || e.namespace.as_deref() == namespace)
            .cloned()
            .collect())
    }

    async fn delete_vector(&self, vector_id: &str, namespace: Option<&str>) -> Result<()> {
        self.entries.lock().await.retain(|e| {
            !(e.id == vector_id && (namespace.is_none() || e.namespace.as_deref() == namespace))
        });
        Ok(())
    }

    fn uses_retrieve_and_generate(&self) -> bool {
        self.retrieve_and_generate
    }

    async fn retrieve_and_generate(
        &self,
        request: RetrieveAndGenerateRequest<'_>,
    ) -> Result<RetrievedAnswer> {
        if !self.retrieve_and_generate {
            return Err(RagError::NotSupported(
                "mock store was built without retrieve-and-generate".to_string(),
            ));
        }
        self.rag_requests.lock().await.push(RecordedRagRequest {
            query: request.query.to_string(),
            count: request.count,
            namespace: request.namespace.map(str::to_string),
            prompt_template: request.prompt_template.to_string(),
            model: request.model.to_string(),
            session_id: request.session_id.map(str::to_string),
        });

        let mut answers = self.answers.lock().await;
        Ok(if answers.is_empty() {
            RetrievedAnswer::new(TextArtifact::new("Mock answer"), None)
        } else {
            answers.remove(0)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedding_lookup_order() {
        let model = MockEmbeddingModel::new(2);
        model.add_embedding(vec![1.0, 0.0]).await;
        model.add_embedding_for("fixed", vec![0.0, 1.0]).await;

        assert_eq!(model.try_embed_chunk("fixed").await.unwrap(), vec![0.0, 1.0]);
        assert_eq!(model.try_embed_chunk("any").await.unwrap(), vec![1.0, 0.0]);
        assert_eq!(model.try_embed_chunk("any").await.unwrap(), vec![0.1, 0.1]);
        assert_eq!(model.call_count(), 3);
    }

    #[tokio::test]
    async fn test_mock_prompt_driver_records_stacks() {
        let driver = MockPromptDriver::new();
        driver.add_response("Hello").await;

        let mut stack = PromptStack::new();
        stack.add_user_input("Hi");
        let out = driver.run(&stack).await.unwrap();
        assert_eq!(out.value, "Hello");
        assert_eq!(driver.stacks().await, vec![stack.clone()]);

        // Queue exhausted
        assert_eq!(driver.run(&stack).await.unwrap().value, "Mock response");
    }

    #[tokio::test]
    async fn test_prompt_run_retries_transient_failure() {
        let driver = MockPromptDriver::new().with_retry_strategy(RetryStrategy::ExponentialBackoff {
            base_delay: std::time::Duration::from_millis(1),
            max_delay: std::time::Duration::from_millis(2),
            max_attempts: 3,
        });
        driver
            .add_failure(RagError::ProviderError("overloaded".into()))
            .await;
        driver.add_response("recovered").await;

        let out = driver.run(&PromptStack::new()).await.unwrap();
        assert_eq!(out.value, "recovered");
        assert_eq!(driver.call_count(), 2);
    }

    #[tokio::test]
    async fn test_prompt_run_without_retry() {
        let driver = MockPromptDriver::new();
        driver.add_failure(RagError::Timeout).await;
        // NoRetry surfaces the driver error unchanged.
        assert!(matches!(
            driver.run(&PromptStack::new()).await,
            Err(RagError::Timeout)
        ));
    }

    #[tokio::test]
    async fn test_mock_prompt_driver_stream() {
        let driver = MockPromptDriver::new();
        driver.add_response("one two three").await;
        let stream = driver.stream(&PromptStack::new()).await.unwrap();
        let fragments: Vec<String> = stream
            .map(|f| f.unwrap().value)
            .collect::<Vec<_>>()
            .await;
        assert_eq!(fragments, vec!["one ", "two ", "three"]);
    }

    #[tokio::test]
    async fn test_mock_vector_store_truncates_to_count() {
        let store = MockVectorStore::new();
        for i in 0..7 {
            store.add_text_result(1.0, format!("segment {}", i)).await.unwrap();
        }
        assert_eq!(store.query("q", None, None).await.unwrap().len(), 5);
        assert_eq!(store.query("q", Some(2), Some("ns")).await.unwrap().len(), 2);

        let queries = store.queries().await;
        assert_eq!(queries[1].namespace.as_deref(), Some("ns"));
    }

    #[tokio::test]
    async fn test_mock_vector_store_rag_disabled() {
        let store = MockVectorStore::new();
        let request = RetrieveAndGenerateRequest {
            query: "q",
            count: None,
            namespace: None,
            prompt_template: "",
            model: "m",
            session_id: None,
        };
        assert!(matches!(
            store.retrieve_and_generate(request).await,
            Err(RagError::NotSupported(_))
        ));
    }
}
