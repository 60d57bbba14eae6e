//! Artifacts: the values that flow between stores, engines and tasks.
//!
//! Artifacts serialize to a tagged JSON object (`{"type": "TextArtifact", ...}`)
//! so a vector store can keep them in entry metadata and hand them back
//! unchanged. Only [`TextArtifact`]s are usable as retrieval context; the
//! other variants exist so callers can tell them apart and skip them.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;

/// Metadata key under which vector stores keep the serialized artifact.
pub const ARTIFACT_METADATA_KEY: &str = "artifact";

fn new_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// A piece of text with a stable identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextArtifact {
    #[serde(default = "new_id")]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub value: String,
}

impl TextArtifact {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            name: None,
            value: value.into(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Display name; the id when no name was given.
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn to_text(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Serialize in the tagged artifact form.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&Artifact::Text(self.clone()))?)
    }
}

impl std::fmt::Display for TextArtifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Informational output that is not an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoArtifact {
    #[serde(default = "new_id")]
    pub id: String,
    pub value: String,
}

impl InfoArtifact {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            value: value.into(),
        }
    }
}

/// A failure captured as a value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorArtifact {
    #[serde(default = "new_id")]
    pub id: String,
    pub value: String,
}

impl ErrorArtifact {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            value: value.into(),
        }
    }
}

/// Any artifact, tagged by type when serialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Artifact {
    #[serde(rename = "TextArtifact")]
    Text(TextArtifact),
    #[serde(rename = "InfoArtifact")]
    Info(InfoArtifact),
    #[serde(rename = "ErrorArtifact")]
    Error(ErrorArtifact),
}

impl Artifact {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn id(&self) -> &str {
        match self {
            Artifact::Text(a) => &a.id,
            Artifact::Info(a) => &a.id,
            Artifact::Error(a) => &a.id,
        }
    }

    pub fn into_text(self) -> Option<TextArtifact> {
        match self {
            Artifact::Text(a) => Some(a),
            _ => None,
        }
    }
}

impl From<TextArtifact> for Artifact {
    fn from(artifact: TextArtifact) -> Self {
        Artifact::Text(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_artifact_json_roundtrip() {
        let artifact = TextArtifact::new("Paris is the capital of France.").with_name("geo");
        let json = artifact.to_json().unwrap();
        let parsed = Artifact::from_json(&json).unwrap();
        assert_eq!(parsed, Artifact::Text(artifact));
    }

    #[test]
    fn test_tagged_form() {
        let artifact = TextArtifact::new("hello");
        let value: serde_json::Value = serde_json::from_str(&artifact.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "TextArtifact");
        assert_eq!(value["value"], "hello");
        assert_eq!(value["id"], artifact.id.as_str());
    }

    #[test]
    fn test_missing_id_gets_generated() {
        let parsed = Artifact::from_json(r#"{"type":"TextArtifact","value":"x"}"#).unwrap();
        let text = parsed.into_text().unwrap();
        assert_eq!(text.value, "x");
        assert_eq!(text.id.len(), 32);
    }

    #[test]
    fn test_non_text_is_not_text() {
        let info = Artifact::Info(InfoArtifact::new("no results"));
        assert!(info.into_text().is_none());
        let error = Artifact::Error(ErrorArtifact::new("boom"));
        assert!(error.clone().into_text().is_none());
        assert_eq!(
            Artifact::from_json(&error.to_json().unwrap()).unwrap(),
            error
        );
    }

    #[test]
    fn test_unknown_type_is_error() {
        assert!(Artifact::from_json(r#"{"type":"BlobArtifact","value":"x"}"#).is_err());
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(TextArtifact::new("a").id, TextArtifact::new("a").id);
    }

    #[test]
    fn test_name_defaults_to_id() {
        let artifact = TextArtifact::new("a");
        assert_eq!(artifact.name(), artifact.id);
    }
}
