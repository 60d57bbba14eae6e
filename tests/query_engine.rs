//! Integration tests for VectorQueryEngine token-budgeted prompt assembly.
//!
//! Token counts use a one-character-per-token tokenizer so budgets can be
//! computed exactly from the rendered templates.

use std::sync::Arc;

use edgequake_rag::templates::{TemplateRenderer, VECTOR_QUERY};
use edgequake_rag::{
    EmbeddingDriver, LocalVectorStore, MockEmbeddingModel, MockPromptDriver, MockVectorStore,
    QueryEngine, QueryOptions, Role, SimpleTokenizer, TextArtifact, VectorQueryEngine,
    DEFAULT_QUERY_PREAMBLE,
};
use serde_json::json;

const QUESTION: &str = "What is the capital of France?";
const ANSWER_OFFSET: usize = 10;

fn render_message(query: &str, segments: &[&str]) -> String {
    TemplateRenderer::new()
        .render(
            VECTOR_QUERY,
            &json!({
                "query": query,
                "metadata": null,
                "text_segments": segments,
                "rulesets": "",
            }),
        )
        .unwrap()
}

/// Tokens the mock driver counts for a one-user-message stack.
fn message_tokens(query: &str, segments: &[&str]) -> usize {
    format!("User: {}", render_message(query, segments))
        .chars()
        .count()
}

async fn engine_with(
    segments: &[&str],
    max_tokens: usize,
) -> (VectorQueryEngine, MockPromptDriver) {
    let store = MockVectorStore::new();
    for (i, segment) in segments.iter().enumerate() {
        store
            .add_text_result(1.0 - i as f32 * 0.1, *segment)
            .await
            .unwrap();
    }
    let driver =
        MockPromptDriver::with_tokenizer(Arc::new(SimpleTokenizer::new(1, max_tokens).unwrap()));
    let engine = VectorQueryEngine::builder()
        .vector_store(Arc::new(store))
        .prompt_driver(Arc::new(driver.clone()))
        .answer_token_offset(ANSWER_OFFSET)
        .build()
        .unwrap();
    (engine, driver)
}

#[tokio::test]
async fn test_best_segments_survive_truncation() {
    let segments = [
        "Paris is the capital and largest city of France.",
        "France is a country in Western Europe with several overseas regions.",
        "The Eiffel Tower was completed in 1889 for the World's Fair held in Paris.",
    ];
    // Room for two segments, not three.
    let max_tokens = message_tokens(QUESTION, &segments[..2]) + ANSWER_OFFSET + 1;
    assert!(message_tokens(QUESTION, &segments) + ANSWER_OFFSET >= max_tokens);

    let (engine, driver) = engine_with(&segments, max_tokens).await;
    driver.add_response("Paris").await;

    let answer = engine.query(QUESTION, &QueryOptions::new()).await.unwrap();
    assert_eq!(answer.text(), "Paris");

    let stack = driver.last_stack().await.unwrap();
    assert_eq!(stack.roles(), vec![Role::System, Role::User]);
    assert_eq!(stack.inputs[0].content, DEFAULT_QUERY_PREAMBLE);
    assert_eq!(stack.inputs[1].content, render_message(QUESTION, &segments[..2]));
    assert!(stack.inputs[1].content.contains(segments[0]));
    assert!(stack.inputs[1].content.contains(segments[1]));
    assert!(!stack.inputs[1].content.contains(segments[2]));
}

#[tokio::test]
async fn test_overflow_at_segment_k_keeps_k_minus_one() {
    let segments = [
        "Segment one about rivers.",
        "Segment two about mountains and valleys.",
        "Segment three about coastlines.",
        "Segment four about islands in the south.",
        "Segment five about deserts.",
    ];

    for k in 1..=segments.len() {
        // Adding segment k reaches the budget exactly.
        let max_tokens = message_tokens(QUESTION, &segments[..k]) + ANSWER_OFFSET;
        let (engine, driver) = engine_with(&segments, max_tokens).await;

        engine.query(QUESTION, &QueryOptions::new()).await.unwrap();

        let stack = driver.last_stack().await.unwrap();
        assert_eq!(
            stack.inputs[1].content,
            render_message(QUESTION, &segments[..k - 1]),
            "overflow at segment {}",
            k
        );
    }
}

#[tokio::test]
async fn test_all_segments_fit() {
    let segments = ["alpha", "beta", "gamma"];
    let (engine, driver) = engine_with(&segments, 4096).await;
    engine.query(QUESTION, &QueryOptions::new()).await.unwrap();
    let stack = driver.last_stack().await.unwrap();
    assert_eq!(stack.inputs[1].content, render_message(QUESTION, &segments));
}

#[tokio::test]
async fn test_zero_segments_still_generates() {
    let (engine, driver) = engine_with(&[], 4096).await;
    driver.add_response("I could not find an answer").await;

    let answer = engine.query(QUESTION, &QueryOptions::new()).await.unwrap();
    assert_eq!(answer.text(), "I could not find an answer");
    assert_eq!(driver.call_count(), 1);
    assert_eq!(
        driver.last_stack().await.unwrap().inputs[1].content,
        render_message(QUESTION, &[])
    );
}

#[tokio::test]
async fn test_local_store_end_to_end() {
    let model = MockEmbeddingModel::new(3);
    model.add_embedding_for(QUESTION, vec![1.0, 0.0, 0.0]).await;
    model
        .add_embedding_for("Paris is the capital of France.", vec![0.9, 0.1, 0.0])
        .await;
    model
        .add_embedding_for("Bananas are rich in potassium.", vec![0.0, 0.0, 1.0])
        .await;

    let embedding_driver = EmbeddingDriver::new(Arc::new(model));
    let store = Arc::new(LocalVectorStore::new(Arc::new(embedding_driver)));
    let driver = MockPromptDriver::new();
    driver.add_response("Paris").await;

    let engine = VectorQueryEngine::builder()
        .vector_store(store)
        .prompt_driver(Arc::new(driver.clone()))
        .build()
        .unwrap();
    engine
        .upsert_text_artifacts(
            &[
                TextArtifact::new("Bananas are rich in potassium."),
                TextArtifact::new("Paris is the capital of France."),
            ],
            Some("facts"),
        )
        .await
        .unwrap();

    let answer = engine
        .query(QUESTION, &QueryOptions::new().namespace("facts").top_n(1))
        .await
        .unwrap();
    assert_eq!(answer.text(), "Paris");

    let message = driver.last_stack().await.unwrap().inputs[1].content.clone();
    assert!(message.contains("Paris is the capital of France."));
    assert!(!message.contains("Bananas"));
    assert_eq!(engine.load_artifacts(Some("facts")).await.unwrap().len(), 2);
}
