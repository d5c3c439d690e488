//! Where chapter texts and alignment templates come from.
//!
//! The engine never reaches into a database or file tree directly; it asks
//! a [`TextSource`] for the two texts and a [`TemplateProvider`] for the
//! template, both passed in explicitly.

use async_trait::async_trait;
use bitext_core::{AlignmentTemplate, TemplateLoadError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::prompts;

/// Errors from text and template sources.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid chapter id: {0:?}")]
    InvalidChapterId(String),

    #[error("Failed to load template {path}: {source}")]
    Template {
        path: PathBuf,
        #[source]
        source: TemplateLoadError,
    },
}

/// Narrow read access to chapter texts.
///
/// `Ok(None)` means the chapter has no text on that side yet.
#[async_trait]
pub trait TextSource: Send + Sync {
    async fn source_text(&self, chapter_id: &str) -> Result<Option<String>, SourceError>;

    async fn target_text(&self, chapter_id: &str) -> Result<Option<String>, SourceError>;
}

/// How a caller asks for a template.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TemplateSelector {
    /// Template bound to a novel, else the default
    Novel(String),

    /// A template by its id
    Explicit(String),
}

/// Resolves the template for an alignment. `None` sends the controller to fallback.
#[async_trait]
pub trait TemplateProvider: Send + Sync {
    async fn resolve(&self, selector: &TemplateSelector) -> Option<AlignmentTemplate>;
}

/// In-process template registry.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary {
    templates: BTreeMap<String, AlignmentTemplate>,
    novels: BTreeMap<String, String>,
    default_id: Option<String>,
}

impl TemplateLibrary {
    /// Empty library; every lookup resolves to `None`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Library whose default is the built-in template.
    pub fn with_builtin() -> Self {
        let builtin = prompts::default_template();
        let mut library = Self::new();
        library.default_id = Some(builtin.id.clone());
        library.register(builtin);
        library
    }

    /// Register a template, replacing any with the same id.
    pub fn register(&mut self, template: AlignmentTemplate) {
        self.templates.insert(template.id.clone(), template);
    }

    pub fn set_default(&mut self, template_id: impl Into<String>) {
        self.default_id = Some(template_id.into());
    }

    pub fn bind_novel(&mut self, novel_id: impl Into<String>, template_id: impl Into<String>) {
        self.novels.insert(novel_id.into(), template_id.into());
    }

    pub fn get(&self, template_id: &str) -> Option<&AlignmentTemplate> {
        self.templates.get(template_id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Register every `.yaml`, `.yml` and `.json` template in `dir`.
    ///
    /// Files are read in name order; returns how many were loaded.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize, SourceError> {
        let dir = dir.as_ref();
        let io_err = |source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_template = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml" | "yml" | "json")
            );
            if is_template && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let template =
                AlignmentTemplate::from_file(path).map_err(|source| SourceError::Template {
                    path: path.clone(),
                    source,
                })?;
            tracing::debug!(template_id = %template.id, path = %path.display(), "Loaded template");
            self.register(template);
        }

        Ok(paths.len())
    }

    fn lookup(&self, selector: &TemplateSelector) -> Option<&AlignmentTemplate> {
        match selector {
            TemplateSelector::Explicit(id) => self.templates.get(id),
            // A binding to an unregistered template counts as no binding
            TemplateSelector::Novel(novel) => self
                .novels
                .get(novel)
                .and_then(|id| self.templates.get(id))
                .or_else(|| {
                    self.default_id
                        .as_ref()
                        .and_then(|id| self.templates.get(id))
                }),
        }
    }
}

#[async_trait]
impl TemplateProvider for TemplateLibrary {
    async fn resolve(&self, selector: &TemplateSelector) -> Option<AlignmentTemplate> {
        self.lookup(selector).cloned()
    }
}

/// Chapter texts held in memory.
#[derive(Debug, Default)]
pub struct MemoryTextSource {
    chapters: RwLock<HashMap<String, (Option<String>, Option<String>)>>,
}

impl MemoryTextSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &self,
        chapter_id: impl Into<String>,
        source: Option<String>,
        target: Option<String>,
    ) {
        self.chapters
            .write()
            .insert(chapter_id.into(), (source, target));
    }
}

#[async_trait]
impl TextSource for MemoryTextSource {
    async fn source_text(&self, chapter_id: &str) -> Result<Option<String>, SourceError> {
        Ok(self
            .chapters
            .read()
            .get(chapter_id)
            .and_then(|(source, _)| source.clone()))
    }

    async fn target_text(&self, chapter_id: &str) -> Result<Option<String>, SourceError> {
        Ok(self
            .chapters
            .read()
            .get(chapter_id)
            .and_then(|(_, target)| target.clone()))
    }
}

/// Chapter texts as `<root>/<chapter_id>.source.txt` and `<root>/<chapter_id>.target.txt`.
#[derive(Debug, Clone)]
pub struct DirectoryTextSource {
    root: PathBuf,
}

impl DirectoryTextSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, chapter_id: &str, side: &str) -> Result<PathBuf, SourceError> {
        let valid = !chapter_id.is_empty()
            && chapter_id != "."
            && chapter_id != ".."
            && !chapter_id.contains(['/', '\\', '\0']);
        if !valid {
            return Err(SourceError::InvalidChapterId(chapter_id.to_string()));
        }
        Ok(self.root.join(format!("{}.{}.txt", chapter_id, side)))
    }

    async fn read(&self, chapter_id: &str, side: &str) -> Result<Option<String>, SourceError> {
        let path = self.path_for(chapter_id, side)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(SourceError::Io { path, source }),
        }
    }
}

#[async_trait]
impl TextSource for DirectoryTextSource {
    async fn source_text(&self, chapter_id: &str) -> Result<Option<String>, SourceError> {
        self.read(chapter_id, "source").await
    }

    async fn target_text(&self, chapter_id: &str) -> Result<Option<String>, SourceError> {
        self.read(chapter_id, "target").await
    }
}
