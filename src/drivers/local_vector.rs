//! In-memory vector store ranked by cosine similarity.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::artifact::{TextArtifact, ARTIFACT_METADATA_KEY};
use crate::embedding::EmbeddingDriver;
use crate::error::Result;
use crate::traits::{QueryResult, VectorEntry, VectorStore, DEFAULT_QUERY_COUNT};

/// Vector store keeping every entry in process memory.
///
/// Entries are keyed by `(namespace, id)` and keep insertion order; equal
/// scores rank in that order.
#[derive(Debug)]
pub struct LocalVectorStore {
    embedding_driver: Arc<EmbeddingDriver>,
    entries: RwLock<Vec<VectorEntry>>,
    include_vectors: bool,
}

impl LocalVectorStore {
    pub fn new(embedding_driver: Arc<EmbeddingDriver>) -> Self {
        Self {
            embedding_driver,
            entries: RwLock::new(Vec::new()),
            include_vectors: false,
        }
    }

    /// Return stored vectors with query results.
    pub fn with_include_vectors(mut self, include_vectors: bool) -> Self {
        self.include_vectors = include_vectors;
        self
    }

    pub fn embedding_driver(&self) -> &EmbeddingDriver {
        &self.embedding_driver
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

fn in_namespace(entry: &VectorEntry, namespace: Option<&str>) -> bool {
    namespace.is_none() || entry.namespace.as_deref() == namespace
}

#[async_trait]
impl VectorStore for LocalVectorStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn query(
        &self,
        query: &str,
        count: Option<usize>,
        namespace: Option<&str>,
    ) -> Result<Vec<QueryResult>> {
        let query_vector = self.embedding_driver.embed_string(query).await?;
        let entries = self.entries.read().await;

        let mut scored: Vec<(f32, &VectorEntry)> = entries
            .iter()
            .filter(|e| in_namespace(e, namespace))
            .map(|e| (cosine_similarity(&query_vector, &e.vector), e))
            .collect();
        // sort_by is stable, so ties keep insertion order.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        let count = count.unwrap_or(DEFAULT_QUERY_COUNT);
        debug!(
            "Local query matched {} entries, returning up to {}",
            scored.len(),
            count
        );

        Ok(scored
            .into_iter()
            .take(count)
            .map(|(score, entry)| QueryResult {
                id: Some(entry.id.clone()),
                score,
                vector: self.include_vectors.then(|| entry.vector.clone()),
                namespace: entry.namespace.clone(),
                metadata: entry.metadata.clone(),
            })
            .collect())
    }

    async fn upsert_vector(
        &self,
        vector: Vec<f32>,
        vector_id: Option<String>,
        namespace: Option<&str>,
        metadata: HashMap<String, String>,
    ) -> Result<String> {
        let id = vector_id.unwrap_or_else(|| Uuid::new_v4().simple().to_string());
        let entry = VectorEntry {
            id: id.clone(),
            vector,
            namespace: namespace.map(str::to_string),
            metadata,
        };

        let mut entries = self.entries.write().await;
        match entries
            .iter_mut()
            .find(|e| e.id == id && e.namespace.as_deref() == namespace)
        {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(id)
    }

    async fn upsert_text_artifact(
        &self,
        artifact: &TextArtifact,
        namespace: Option<&str>,
    ) -> Result<String> {
        let vector = self.embedding_driver.embed_text_artifact(artifact).await?;
        let mut metadata = HashMap::new();
        metadata.insert(ARTIFACT_METADATA_KEY.to_string(), artifact.to_json()?);
        self.upsert_vector(vector, Some(artifact.id.clone()), namespace, metadata)
            .await
    }

    async fn load_entry(
        &self,
        vector_id: &str,
        namespace: Option<&str>,
    ) -> Result<Option<VectorEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .find(|e| e.id == vector_id && in_namespace(e, namespace))
            .cloned())
    }

    async fn load_entries(&self, namespace: Option<&str>) -> Result<Vec<VectorEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|e| in_namespace(e, namespace))
            .cloned()
            .collect())
    }

    async fn delete_vector(&self, vector_id: &str, namespace: Option<&str>) -> Result<()> {
        self.entries
            .write()
            .await
            .retain(|e| !(e.id == vector_id && in_namespace(e, namespace)));
        Ok(())
    }
}

/// Cosine similarity; 0.0 for empty, mismatched or zero-norm vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::MockEmbeddingModel;

    async fn store() -> (LocalVectorStore, MockEmbeddingModel) {
        let model = MockEmbeddingModel::new(2);
        model.add_embedding_for("north", vec![0.0, 1.0]).await;
        model.add_embedding_for("east", vec![1.0, 0.0]).await;
        model.add_embedding_for("north-east", vec![1.0, 1.0]).await;
        let driver = EmbeddingDriver::new(Arc::new(model.clone()));
        (LocalVectorStore::new(Arc::new(driver)), model)
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[tokio::test]
    async fn test_query_ranks_by_similarity() {
        let (store, _) = store().await;
        store
            .upsert_text_artifact(&TextArtifact::new("east"), None)
            .await
            .unwrap();
        store
            .upsert_text_artifact(&TextArtifact::new("north-east"), None)
            .await
            .unwrap();
        store
            .upsert_text_artifact(&TextArtifact::new("north"), None)
            .await
            .unwrap();

        let results = store.query("north", None, None).await.unwrap();
        let texts: Vec<String> = results
            .iter()
            .map(|r| r.text_artifact().unwrap().value)
            .collect();
        assert_eq!(texts, vec!["north", "north-east", "east"]);
        assert!(results[0].vector.is_none());
    }

    #[tokio::test]
    async fn test_query_respects_count_and_namespace() {
        let (store, _) = store().await;
        let store = store.with_include_vectors(true);
        store
            .upsert_text_artifact(&TextArtifact::new("north"), Some("a"))
            .await
            .unwrap();
        store
            .upsert_text_artifact(&TextArtifact::new("east"), Some("b"))
            .await
            .unwrap();

        let results = store.query("north", Some(5), Some("b")).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].namespace.as_deref(), Some("b"));
        assert_eq!(results[0].vector, Some(vec![1.0, 0.0]));

        assert_eq!(store.query("north", Some(1), None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_id() {
        let (store, _) = store().await;
        let id = store
            .upsert_vector(vec![1.0, 0.0], Some("v1".into()), None, HashMap::new())
            .await
            .unwrap();
        store
            .upsert_vector(vec![0.0, 1.0], Some(id.clone()), None, HashMap::new())
            .await
            .unwrap();

        assert_eq!(store.len().await, 1);
        let entry = store.load_entry(&id, None).await.unwrap().unwrap();
        assert_eq!(entry.vector, vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_load_and_delete() {
        let (store, _) = store().await;
        let artifact = TextArtifact::new("north");
        let id = store
            .upsert_text_artifact(&artifact, Some("docs"))
            .await
            .unwrap();
        assert_eq!(id, artifact.id);

        assert!(store.load_entry(&id, Some("other")).await.unwrap().is_none());
        let entry = store.load_entry(&id, Some("docs")).await.unwrap().unwrap();
        assert_eq!(entry.text_artifact(), Some(artifact));
        assert_eq!(store.load_entries(Some("docs")).await.unwrap().len(), 1);

        store.delete_vector(&id, Some("other")).await.unwrap();
        assert_eq!(store.len().await, 1);
        store.delete_vector(&id, Some("docs")).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_same_artifact_in_two_namespaces() {
        let (store, _) = store().await;
        let artifact = TextArtifact::new("north");
        store
            .upsert_text_artifact(&artifact, Some("ns_a"))
            .await
            .unwrap();
        store
            .upsert_text_artifact(&artifact, Some("ns_b"))
            .await
            .unwrap();

        assert_eq!(store.load_entries(Some("ns_a")).await.unwrap().len(), 1);
        assert_eq!(store.load_entries(Some("ns_b")).await.unwrap().len(), 1);
        assert!(store
            .load_entry(&artifact.id, Some("ns_a"))
            .await
            .unwrap()
            .is_some());

        store.delete_vector(&artifact.id, Some("ns_a")).await.unwrap();
        assert!(store.load_entries(Some("ns_a")).await.unwrap().is_empty());
        assert_eq!(store.load_entries(Some("ns_b")).await.unwrap().len(), 1);

        store.delete_vector(&artifact.id, None).await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_generated_ids_are_unique() {
        let (store, _) = store().await;
        let a = store
            .upsert_vector(vec![1.0, 0.0], None, None, HashMap::new())
            .await
            .unwrap();
        let b = store
            .upsert_vector(vec![1.0, 0.0], None, None, HashMap::new())
            .await
            .unwrap();
        assert_ne!(a, b);
    }
}
