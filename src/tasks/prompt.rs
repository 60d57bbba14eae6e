use serde_json::json;
use std::sync::Arc;

use crate::artifact::TextArtifact;
use crate::error::Result;
use crate::memory::{ConversationMemory, Run};
use crate::prompt_stack::PromptStack;
use crate::rules::Ruleset;
use crate::templates::{TemplateRenderer, PROMPT_TASK_REWRITE, PROMPT_TASK_SYSTEM};
use crate::traits::PromptDriver;

/// A conversational prompt over a prompt driver.
///
/// Stacks are built as system, prior runs, current input, then the task's
/// own previous output when it has already run.
#[derive(Clone)]
pub struct PromptTask {
    prompt_driver: Arc<dyn PromptDriver>,
    rulesets: Vec<Ruleset>,
    rewrite_question: bool,
    templates: TemplateRenderer,
    output: Option<TextArtifact>,
}

impl std::fmt::Debug for PromptTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTask")
            .field("model", &self.prompt_driver.model())
            .field("rewrite_question", &self.rewrite_question)
            .field("output", &self.output)
            .finish()
    }
}

impl PromptTask {
    pub fn new(prompt_driver: Arc<dyn PromptDriver>) -> Self {
        Self {
            prompt_driver,
            rulesets: Vec::new(),
            rewrite_question: false,
            templates: TemplateRenderer::new(),
            output: None,
        }
    }

    pub fn with_rulesets(mut self, rulesets: Vec<Ruleset>) -> Self {
        self.rulesets = rulesets;
        self
    }

    /// Ask the model to restate the input as a standalone question given
    /// the conversation so far, instead of answering it.
    pub fn with_question_rewrite(mut self, rewrite: bool) -> Self {
        self.rewrite_question = rewrite;
        self
    }

    pub fn with_templates(mut self, templates: TemplateRenderer) -> Self {
        self.templates = templates;
        self
    }

    pub fn output(&self) -> Option<&TextArtifact> {
        self.output.as_ref()
    }

    pub fn prompt_stack(
        &self,
        input: &str,
        memory: Option<&ConversationMemory>,
    ) -> Result<PromptStack> {
        let rulesets = self.templates.render_rulesets(&self.rulesets)?;
        let system = self
            .templates
            .render(PROMPT_TASK_SYSTEM, &json!({ "rulesets": rulesets }))?;
        let user = if self.rewrite_question {
            self.templates
                .render(PROMPT_TASK_REWRITE, &json!({ "input": input }))?
        } else {
            input.to_string()
        };

        let mut stack = PromptStack::new();
        stack.add_system_input(system).add_user_input(user);
        if let Some(output) = &self.output {
            stack.add_assistant_input(output.to_text());
        }
        if let Some(memory) = memory {
            // Right after the system message.
            stack.add_conversation_memory(memory, 1);
        }
        Ok(stack)
    }

    /// Run the prompt and record the exchange in `memory`.
    pub async fn run(
        &mut self,
        input: &str,
        memory: &mut ConversationMemory,
    ) -> Result<TextArtifact> {
        let stack = self.prompt_stack(input, Some(&*memory))?;
        let output = self.prompt_driver.run(&stack).await?;

        memory.add_run(Run::new(input, output.value.clone()));
        self.output = Some(output.clone());
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::mock::MockPromptDriver;
    use crate::prompt_stack::Role;
    use crate::rules::Rule;

    #[test]
    fn test_stack_order_with_memory() {
        let task = PromptTask::new(Arc::new(MockPromptDriver::new()));
        let mut memory = ConversationMemory::new();
        memory.add_run(Run::new("q1", "a1"));

        let stack = task.prompt_stack("q2", Some(&memory)).unwrap();
        assert_eq!(
            stack.roles(),
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(stack.inputs[1].content, "q1");
        assert_eq!(stack.inputs[2].content, "a1");
        assert_eq!(stack.inputs[3].content, "q2");
    }

    #[test]
    fn test_rulesets_in_system_message() {
        let task = PromptTask::new(Arc::new(MockPromptDriver::new()))
            .with_rulesets(vec![Ruleset::new("tone", vec![Rule::new("Be polite.")])]);
        let stack = task.prompt_stack("hi", None).unwrap();
        assert!(stack.inputs[0].content.starts_with("You are a helpful assistant."));
        assert!(stack.inputs[0].content.contains("Be polite."));
    }

    #[test]
    fn test_question_rewrite() {
        let task =
            PromptTask::new(Arc::new(MockPromptDriver::new())).with_question_rewrite(true);
        let stack = task.prompt_stack("and its population?", None).unwrap();
        assert!(stack.inputs[1]
            .content
            .starts_with("How would you ask the question considering the previous conversation: and its population?."));
    }

    #[tokio::test]
    async fn test_rerun_appends_previous_output() {
        let driver = MockPromptDriver::new();
        driver.add_response("first").await;
        driver.add_response("second").await;
        let mut task = PromptTask::new(Arc::new(driver.clone()));
        let mut memory = ConversationMemory::new();

        assert_eq!(task.run("hello", &mut memory).await.unwrap().value, "first");
        assert_eq!(task.output().map(|o| o.value.as_str()), Some("first"));
        task.run("again", &mut memory).await.unwrap();

        let stack = driver.last_stack().await.unwrap();
        assert_eq!(
            stack.roles(),
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::User,
                Role::Assistant
            ]
        );
        assert_eq!(stack.inputs[3].content, "again");
        assert_eq!(stack.inputs[4].content, "first");
        assert_eq!(memory.len(), 2);
    }
}
