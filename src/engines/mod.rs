//! Query engines.

pub mod query;

pub use query::{
    QueryAnswer, QueryEngine, QueryOptions, VectorQueryEngine, VectorQueryEngineBuilder,
    DEFAULT_QUERY_PREAMBLE,
};
