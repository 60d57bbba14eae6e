//! Named prompt templates rendered with MiniJinja.
//!
//! Built-in templates are embedded at compile time; callers may replace any
//! of them by name. Rendering is pure: the same name and variables always
//! produce the same string. Output is trimmed of surrounding whitespace.
//!
//! | Name | Variables |
//! |------|-----------|
//! | `vector_query` | `query`, `text_segments`, `metadata`, `rulesets` |
//! | `vector_system` | `preamble` |
//! | `vector_generate` | `preamble`, `rulesets`, `appendix` |
//! | `rulesets` | `rulesets` (list of [`Ruleset`]) |
//! | `prompt_task_system` | `rulesets` |
//! | `prompt_task_rewrite` | `input` |

use minijinja::{Environment, Value};
use serde::Serialize;

use crate::error::Result;
use crate::rules::Ruleset;

pub const VECTOR_QUERY: &str = "vector_query";
pub const VECTOR_SYSTEM: &str = "vector_system";
pub const VECTOR_GENERATE: &str = "vector_generate";
pub const RULESETS: &str = "rulesets";
pub const PROMPT_TASK_SYSTEM: &str = "prompt_task_system";
pub const PROMPT_TASK_REWRITE: &str = "prompt_task_rewrite";

const BUILTIN_TEMPLATES: &[(&str, &str)] = &[
    (VECTOR_QUERY, include_str!("templates/vector_query.j2")),
    (VECTOR_SYSTEM, include_str!("templates/vector_system.j2")),
    (VECTOR_GENERATE, include_str!("templates/vector_generate.j2")),
    (RULESETS, include_str!("templates/rulesets.j2")),
    (PROMPT_TASK_SYSTEM, include_str!("templates/prompt_task_system.j2")),
    (PROMPT_TASK_REWRITE, include_str!("templates/prompt_task_rewrite.j2")),
];

/// Renders templates by name.
#[derive(Debug, Clone)]
pub struct TemplateRenderer {
    env: Environment<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    /// Renderer with the built-in templates.
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);
        for (name, source) in BUILTIN_TEMPLATES {
            if let Err(e) = env.add_template(*name, *source) {
                tracing::error!("Failed to register built-in template {}: {}", name, e);
            }
        }
        Self { env }
    }

    /// Add or replace a template.
    pub fn with_template(
        mut self,
        name: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self> {
        self.env.add_template_owned(name.into(), source.into())?;
        Ok(self)
    }

    /// Render `name` with serializable variables.
    pub fn render<S: Serialize>(&self, name: &str, context: &S) -> Result<String> {
        let template = self.env.get_template(name)?;
        let rendered = template.render(Value::from_serialize(context))?;
        Ok(rendered.trim().to_string())
    }

    /// Render rulesets to a prompt fragment; empty when there are none.
    pub fn render_rulesets(&self, rulesets: &[Ruleset]) -> Result<String> {
        if rulesets.iter().all(Ruleset::is_empty) {
            return Ok(String::new());
        }
        self.render(RULESETS, &serde_json::json!({ "rulesets": rulesets }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::Rule;
    use serde_json::json;

    #[test]
    fn test_builtins_registered() {
        let renderer = TemplateRenderer::new();
        for (name, _) in BUILTIN_TEMPLATES {
            assert!(renderer.env.get_template(name).is_ok(), "missing {}", name);
        }
    }

    #[test]
    fn test_vector_query_lists_segments() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render(
                VECTOR_QUERY,
                &json!({
                    "query": "What is the capital of France?",
                    "text_segments": ["Paris is in France.", "France is in Europe."],
                    "metadata": null,
                    "rulesets": "",
                }),
            )
            .unwrap();
        assert!(out.starts_with("Text segments:"));
        assert!(out.contains("Text segment 1:\n\"\"\"\nParis is in France.\n\"\"\""));
        assert!(out.contains("Text segment 2:"));
        assert!(out.contains("Query: What is the capital of France?"));
        assert!(out.ends_with("Answer:"));
        assert!(!out.contains("Metadata:"));
    }

    #[test]
    fn test_vector_query_empty_segments() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render(
                VECTOR_QUERY,
                &json!({ "query": "q", "text_segments": [], "metadata": "source: wiki" }),
            )
            .unwrap();
        assert!(out.starts_with("Metadata:\nsource: wiki"));
        assert!(!out.contains("Text segment 1"));
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = TemplateRenderer::new();
        let ctx = json!({ "preamble": "Be truthful." });
        assert_eq!(
            renderer.render(VECTOR_SYSTEM, &ctx).unwrap(),
            renderer.render(VECTOR_SYSTEM, &ctx).unwrap()
        );
        assert_eq!(renderer.render(VECTOR_SYSTEM, &ctx).unwrap(), "Be truthful.");
    }

    #[test]
    fn test_vector_generate_keeps_placeholder() {
        let renderer = TemplateRenderer::new();
        let out = renderer
            .render(
                VECTOR_GENERATE,
                &json!({ "preamble": "P", "rulesets": "", "appendix": "Answer in French." }),
            )
            .unwrap();
        assert!(out.contains("$search_results$"));
        assert!(out.ends_with("Answer in French."));
    }

    #[test]
    fn test_render_rulesets() {
        let renderer = TemplateRenderer::new();
        assert_eq!(renderer.render_rulesets(&[]).unwrap(), "");

        let rulesets = vec![Ruleset::new(
            "style",
            vec![Rule::new("Be concise."), Rule::new("Cite segments.")],
        )];
        let out = renderer.render_rulesets(&rulesets).unwrap();
        assert!(out.contains("Ruleset name: style"));
        assert!(out.contains("Rule #2\nCite segments."));
    }

    #[test]
    fn test_override_template() {
        let renderer = TemplateRenderer::new()
            .with_template(VECTOR_SYSTEM, "SYSTEM: {{ preamble }}")
            .unwrap();
        assert_eq!(
            renderer
                .render(VECTOR_SYSTEM, &json!({ "preamble": "x" }))
                .unwrap(),
            "SYSTEM: x"
        );
    }

    #[test]
    fn test_unknown_template_is_error() {
        let renderer = TemplateRenderer::new();
        assert!(matches!(
            renderer.render("missing", &json!({})),
            Err(crate::error::RagError::TemplateError(_))
        ));
    }
}
