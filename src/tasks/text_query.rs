use std::sync::Arc;
use tracing::debug;

use crate::engines::{QueryAnswer, QueryEngine, QueryOptions};
use crate::error::Result;
use crate::memory::{ConversationMemory, Run};
use crate::rules::Ruleset;

/// Answers input through a query engine and records the exchange.
///
/// The stored output is the answer's protocol text, so a delegated backend
/// session carries over to the next call on the same memory.
#[derive(Clone)]
pub struct TextQueryTask {
    engine: Arc<dyn QueryEngine>,
    namespace: Option<String>,
    top_n: Option<usize>,
    preamble: Option<String>,
    metadata: Option<String>,
    rulesets: Vec<Ruleset>,
}

impl std::fmt::Debug for TextQueryTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextQueryTask")
            .field("namespace", &self.namespace)
            .field("top_n", &self.top_n)
            .field("rulesets", &self.rulesets.len())
            .finish()
    }
}

impl TextQueryTask {
    pub fn new(engine: Arc<dyn QueryEngine>) -> Self {
        Self {
            engine,
            namespace: None,
            top_n: None,
            preamble: None,
            metadata: None,
            rulesets: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = Some(top_n);
        self
    }

    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = Some(preamble.into());
        self
    }

    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = Some(metadata.into());
        self
    }

    pub fn with_rulesets(mut self, rulesets: Vec<Ruleset>) -> Self {
        self.rulesets = rulesets;
        self
    }

    pub async fn run(&self, input: &str, memory: &mut ConversationMemory) -> Result<QueryAnswer> {
        let answer = {
            let options = QueryOptions {
                namespace: self.namespace.clone(),
                rulesets: self.rulesets.clone(),
                metadata: self.metadata.clone(),
                top_n: self.top_n,
                preamble: self.preamble.clone(),
                memory: Some(&*memory),
            };
            self.engine.query(input, &options).await?
        };

        debug!("Recording run, session: {:?}", answer.session_id);
        memory.add_run(Run::new(input, answer.to_protocol_text()));
        Ok(answer)
    }
}
