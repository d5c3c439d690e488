//! Template parsing from YAML/JSON.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use super::render::{render_prompt, TemplateError};

/// Errors that can occur when loading templates.
#[derive(Error, Debug)]
pub enum TemplateLoadError {
    #[error("Failed to read template file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Template validation failed: {0}")]
    ValidationError(String),

    #[error("Template does not render: {0}")]
    Render(#[from] TemplateError),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// An alignment instruction plus its sampling settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AlignmentTemplate {
    /// Unique identifier, recorded with every stored alignment
    pub id: String,

    /// Instruction body with `{source_text}` and `{target_text}`
    pub alignment_prompt_template: String,

    /// System prompt sent alongside the instruction
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens the oracle may generate
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    8192
}

impl AlignmentTemplate {
    /// Build a template in code; validated like a parsed one.
    pub fn new(
        id: impl Into<String>,
        alignment_prompt_template: impl Into<String>,
    ) -> Result<Self, TemplateLoadError> {
        let template = Self {
            id: id.into(),
            alignment_prompt_template: alignment_prompt_template.into(),
            system_prompt: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        };
        template.validate()?;
        Ok(template)
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    /// Parse a template from YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, TemplateLoadError> {
        let template: AlignmentTemplate = serde_yaml::from_str(yaml)?;
        template.validate()?;
        Ok(template)
    }

    /// Parse a template from JSON string.
    pub fn from_json(json: &str) -> Result<Self, TemplateLoadError> {
        let template: AlignmentTemplate = serde_json::from_str(json)?;
        template.validate()?;
        Ok(template)
    }

    /// Parse a template from a file, choosing the format by extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TemplateLoadError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&contents),
            _ => Self::from_yaml(&contents),
        }
    }

    /// Render the instruction for one chapter.
    pub fn render(&self, source: &str, target: &str) -> Result<String, TemplateError> {
        render_prompt(&self.alignment_prompt_template, source, target)
    }

    /// Validate the template structure.
    pub fn validate(&self) -> Result<(), TemplateLoadError> {
        if self.id.trim().is_empty() {
            return Err(TemplateLoadError::MissingField("id".to_string()));
        }

        if self.alignment_prompt_template.trim().is_empty() {
            return Err(TemplateLoadError::MissingField(
                "alignment_prompt_template".to_string(),
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(TemplateLoadError::ValidationError(format!(
                "temperature {} outside 0.0-2.0",
                self.temperature
            )));
        }

        if self.max_tokens == 0 {
            return Err(TemplateLoadError::ValidationError(
                "max_tokens must be positive".to_string(),
            ));
        }

        // Probe render so a broken template is caught at load time
        self.render("", "")?;

        Ok(())
    }
}
