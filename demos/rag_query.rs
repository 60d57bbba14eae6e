//! RAG query example
//!
//! Demonstrates retrieval-augmented answering over an in-memory store.
//!
//! Run with: cargo run --example rag_query
//! Logging: RUST_LOG=edgequake_rag=debug cargo run --example rag_query
//!
//! This example shows:
//! - Loading `RagConfig` (env var, ./rag.toml, ~/.edgequake/rag.toml, defaults)
//! - Embedding and storing documents in a `LocalVectorStore`
//! - Asking follow-up questions through a `TextQueryTask` with memory
//!
//! The mock collaborators stand in for real embedding and chat backends.

use std::sync::Arc;

use edgequake_rag::{
    ConversationMemory, EmbeddingDriver, LocalVectorStore, MockEmbeddingModel, MockPromptDriver,
    QueryEngine, RagConfig, Rule, Ruleset, SimpleTokenizer, TextArtifact, TextQueryTask,
    VectorQueryEngine,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = RagConfig::load()?;

    println!("EdgeQuake RAG - Query Example\n");
    println!("Answer token offset: {}", config.query.answer_token_offset);
    println!("Top N: {}", config.query.top_n);
    println!("{}", "─".repeat(50));

    // Embedding backend with a few hand-made vectors
    let model = MockEmbeddingModel::new(3);
    let documents = [
        ("Rust guarantees memory safety without a garbage collector.", [1.0, 0.1, 0.0]),
        ("Python is popular for data science.", [0.0, 1.0, 0.1]),
        ("The borrow checker enforces Rust's ownership rules.", [0.9, 0.0, 0.2]),
    ];
    for (text, vector) in &documents {
        model.add_embedding_for(*text, vector.to_vec()).await;
    }
    let question = "How does Rust stay memory safe?";
    model.add_embedding_for(question, vec![1.0, 0.0, 0.1]).await;

    let embedding_driver = EmbeddingDriver::new(Arc::new(model))
        .with_tokenizer(Arc::new(SimpleTokenizer::new(
            4,
            config.embedding.max_tokens,
        )?))?
        .with_retry_strategy(config.retry.strategy());
    let store = Arc::new(LocalVectorStore::new(Arc::new(embedding_driver)));

    let prompt_driver = MockPromptDriver::new().with_retry_strategy(config.retry.strategy());
    prompt_driver
        .add_response("Rust relies on ownership and the borrow checker.")
        .await;

    let engine = VectorQueryEngine::builder()
        .vector_store(store)
        .prompt_driver(Arc::new(prompt_driver.clone()))
        .query_config(&config.query)
        .build()?;

    let artifacts: Vec<TextArtifact> = documents
        .iter()
        .map(|(text, _)| TextArtifact::new(*text))
        .collect();
    let ids = engine.upsert_text_artifacts(&artifacts, Some("docs")).await?;
    println!("Stored {} documents", ids.len());

    let task = TextQueryTask::new(Arc::new(engine))
        .with_namespace("docs")
        .with_rulesets(vec![Ruleset::new(
            "style",
            vec![Rule::new("Answer in one sentence.")],
        )]);

    let mut memory = ConversationMemory::new();
    let answer = task.run(question, &mut memory).await?;

    println!("\nQ: {}", question);
    println!("A: {}", answer.text());

    if let Some(stack) = prompt_driver.last_stack().await {
        println!("\nPrompt sent to the model:");
        for input in &stack.inputs {
            println!("[{}]\n{}\n", input.role.as_str(), input.content);
        }
    }

    println!("Memory holds {} run(s)", memory.len());
    Ok(())
}
