//! Alignment templates and prompt rendering.
//!
//! A template is the instruction sent to the oracle, with two placeholders
//! for the chapter texts, plus the sampling settings that go with it.
//! Templates are structured data loaded from YAML or JSON.

mod parser;
mod render;

pub use parser::{AlignmentTemplate, TemplateLoadError};
pub use render::{render_prompt, TemplateError, SOURCE_PLACEHOLDER, TARGET_PLACEHOLDER};
