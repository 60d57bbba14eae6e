//! Ordered, role-tagged message sequences sent to prompt drivers.
//!
//! Order is significant: backends route system content and the user/assistant
//! turn sequence through different wire fields, so the position of every
//! input must be preserved exactly as built.

use serde::{Deserialize, Serialize};

use crate::memory::ConversationMemory;

/// Role of a prompt input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a prompt stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptInput {
    pub content: String,
    pub role: Role,
}

impl PromptInput {
    pub fn new(content: impl Into<String>, role: Role) -> Self {
        Self {
            content: content.into(),
            role,
        }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }

    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }
}

/// System content separated from the turn sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitPrompt<'a> {
    /// Non-empty system contents, in stack order.
    pub system: Vec<&'a str>,
    /// User and assistant inputs, in stack order.
    pub turns: Vec<&'a PromptInput>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptStack {
    pub inputs: Vec<PromptInput>,
}

impl PromptStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_inputs(inputs: Vec<PromptInput>) -> Self {
        Self { inputs }
    }

    pub fn add_input(&mut self, content: impl Into<String>, role: Role) -> &mut Self {
        self.inputs.push(PromptInput::new(content, role));
        self
    }

    pub fn add_system_input(&mut self, content: impl Into<String>) -> &mut Self {
        self.add_input(content, Role::System)
    }

    pub fn add_user_input(&mut self, content: impl Into<String>) -> &mut Self {
        self.add_input(content, Role::User)
    }

    pub fn add_assistant_input(&mut self, content: impl Into<String>) -> &mut Self {
        self.add_input(content, Role::Assistant)
    }

    /// Insert each remembered run as a user/assistant pair starting at
    /// `index` (clamped to the stack length). Session-id suffixes are
    /// stripped from stored outputs.
    pub fn add_conversation_memory(
        &mut self,
        memory: &ConversationMemory,
        index: usize,
    ) -> &mut Self {
        let mut at = index.min(self.inputs.len());
        for run in memory.prompt_runs() {
            self.inputs
                .insert(at, PromptInput::new(run.input.clone(), Role::User));
            self.inputs
                .insert(at + 1, PromptInput::new(run.answer(), Role::Assistant));
            at += 2;
        }
        self
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn roles(&self) -> Vec<Role> {
        self.inputs.iter().map(|i| i.role).collect()
    }

    /// Separate system content from the user/assistant turns.
    pub fn split_system(&self) -> SplitPrompt<'_> {
        let system = self
            .inputs
            .iter()
            .filter(|i| i.is_system() && !i.content.is_empty())
            .map(|i| i.content.as_str())
            .collect();
        let turns = self.inputs.iter().filter(|i| !i.is_system()).collect();
        SplitPrompt { system, turns }
    }

    /// Flatten to a single string, used for token counting.
    pub fn to_prompt_string(&self) -> String {
        self.inputs
            .iter()
            .map(|i| format!("{}: {}", role_label(i.role), i.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::System => "System",
        Role::User => "User",
        Role::Assistant => "Assistant",
    }
}
