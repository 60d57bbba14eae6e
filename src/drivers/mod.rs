//! Collaborator implementations.
//!
//! - [`LocalVectorStore`]: in-memory cosine-similarity store
//! - [`mock`]: deterministic mocks for tests

pub mod local_vector;
pub mod mock;

pub use local_vector::{cosine_similarity, LocalVectorStore};
pub use mock::{MockEmbeddingModel, MockPromptDriver, MockVectorStore};
