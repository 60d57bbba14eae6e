//! EdgeQuake RAG - Retrieval-Augmented Generation Core
//!
//! This crate provides the pieces between a user's question and a grounded
//! answer:
//! - Token counting and context-window budgets
//! - Embedding of arbitrarily long text (chunk, embed, weighted average)
//! - Vector storage and nearest-neighbor retrieval
//! - Token-bounded prompt assembly and generation
//! - Conversation memory with delegated-session continuity
//!
//! # Architecture
//!
//! ```text
//! query ──► VectorStore ──► segments ──► token-bounded prompt ──► PromptDriver ──► answer
//!    │                                                                  ▲
//!    └──────── retrieve_and_generate (delegated backends) ──────────────┘
//! ```
//!
//! Collaborators are traits ([`EmbeddingModel`], [`VectorStore`],
//! [`PromptDriver`], [`Tokenizer`]); vendor integrations implement them.
//! The crate ships [`LocalVectorStore`] and deterministic mocks.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use edgequake_rag::{QueryEngine, QueryOptions, VectorQueryEngine};
//!
//! let engine = VectorQueryEngine::builder()
//!     .vector_store(store)
//!     .prompt_driver(driver)
//!     .build()?;
//! let answer = engine
//!     .query("What is the capital of France?", &QueryOptions::new())
//!     .await?;
//! println!("{}", answer.text());
//! ```
//!
//! # See Also
//!
//! - [`crate::traits`] for collaborator trait definitions
//! - [`crate::engines`] for the query engine
//! - [`crate::config`] for TOML configuration

pub mod artifact;
pub mod chunker;
pub mod config;
pub mod drivers;
pub mod embedding;
pub mod engines;
pub mod error;
pub mod memory;
pub mod prompt_stack;
pub mod retry;
pub mod rules;
pub mod tasks;
pub mod templates;
pub mod tokenizer;
pub mod traits;

pub use artifact::{Artifact, ErrorArtifact, InfoArtifact, TextArtifact};
pub use chunker::{Chunk, TextChunker};
pub use config::{EmbeddingConfig, QueryConfig, RagConfig, RagConfigError, RetryConfig};
pub use drivers::{LocalVectorStore, MockEmbeddingModel, MockPromptDriver, MockVectorStore};
pub use embedding::EmbeddingDriver;
pub use engines::{
    QueryAnswer, QueryEngine, QueryOptions, VectorQueryEngine, VectorQueryEngineBuilder,
    DEFAULT_QUERY_PREAMBLE,
};
pub use error::{RagError, Result, RetryStrategy};
pub use memory::{ConversationMemory, Run};
pub use prompt_stack::{PromptInput, PromptStack, Role};
pub use retry::RetryExecutor;
pub use rules::{Rule, Ruleset};
pub use tasks::{PromptTask, TextQueryTask};
pub use templates::TemplateRenderer;
pub use tokenizer::{SimpleTokenizer, TiktokenTokenizer, Tokenizer};
pub use traits::{
    EmbeddingModel, PromptDriver, QueryResult, RetrieveAndGenerateRequest, RetrievedAnswer,
    VectorEntry, VectorStore, DEFAULT_QUERY_COUNT,
};
