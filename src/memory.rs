//! Conversation memory: the ordered record of past runs.
//!
//! Memory is append-only during a session. Besides feeding prior turns into
//! prompt stacks, it carries session continuity for delegated
//! retrieve-and-generate backends: the answer of such a backend is stored
//! as `"<answer><SID><session id>"`, and the next query recovers the id from
//! the last run's output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delimiter between an answer and the backend session id in stored output.
pub const SESSION_ID_DELIMITER: &str = "<SID>";

/// One input/output exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: String,
    pub added_at: DateTime<Utc>,
    pub input: String,
    pub output: String,
}

impl Run {
    pub fn new(input: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            added_at: Utc::now(),
            input: input.into(),
            output: output.into(),
        }
    }

    /// Output without any session-id suffix.
    pub fn answer(&self) -> &str {
        split_session_id(&self.output).0
    }

    /// Session id carried in the output, if any.
    pub fn session_id(&self) -> Option<&str> {
        split_session_id(&self.output).1
    }
}

/// Split `"<answer><SID><id>"` into its parts. The id is whatever follows
/// the last delimiter; an empty id counts as absent.
pub fn split_session_id(output: &str) -> (&str, Option<&str>) {
    match output.rsplit_once(SESSION_ID_DELIMITER) {
        Some((answer, id)) if !id.is_empty() => (answer, Some(id)),
        Some((answer, _)) => (answer, None),
        None => (output, None),
    }
}

/// Append `"<SID><id>"` to an answer.
pub fn encode_session_id(answer: &str, session_id: &str) -> String {
    format!("{}{}{}", answer, SESSION_ID_DELIMITER, session_id)
}

/// Ordered, append-only list of runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationMemory {
    runs: Vec<Run>,
    /// How many of the most recent runs to inject into prompts.
    #[serde(default)]
    max_runs: Option<usize>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit prompt injection to the most recent `max_runs` runs.
    pub fn with_max_runs(mut self, max_runs: usize) -> Self {
        self.max_runs = Some(max_runs);
        self
    }

    pub fn add_run(&mut self, run: Run) {
        self.runs.push(run);
    }

    pub fn runs(&self) -> &[Run] {
        &self.runs
    }

    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.runs.len()
    }

    pub fn last_run(&self) -> Option<&Run> {
        self.runs.last()
    }

    /// Runs to place in a prompt, oldest first.
    pub fn prompt_runs(&self) -> &[Run] {
        match self.max_runs {
            Some(max) if max < self.runs.len() => &self.runs[self.runs.len() - max..],
            _ => &self.runs,
        }
    }

    /// Session id of the delegated backend, from the most recent run.
    pub fn last_session_id(&self) -> Option<&str> {
        self.last_run().and_then(Run::session_id)
    }

    pub fn to_json(&self) -> crate::error::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
