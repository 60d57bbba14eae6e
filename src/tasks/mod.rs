//! Tasks wiring engines and prompt drivers to conversation memory.
//!
//! - [`TextQueryTask`]: answers from stored text through a [`crate::engines::QueryEngine`]
//! - [`PromptTask`]: plain conversation through a [`crate::traits::PromptDriver`]
//!
//! Both record each exchange as a [`crate::memory::Run`].

pub mod prompt;
pub mod text_query;

pub use prompt::PromptTask;
pub use text_query::TextQueryTask;
