//! Chapter-level alignment service.
//!
//! Wires a [`TextSource`], a [`TemplateProvider`], the controller and an
//! [`AlignmentStore`] together. Stored entries are served as they are;
//! only [`AlignmentService::regenerate`] replaces one. A service built with
//! [`AlignmentService::offline`] never calls an oracle.

use bitext_core::RenderPayload;
use std::sync::Arc;
use thiserror::Error;

use crate::controller::{AlignmentController, AlignmentError, AlignmentOutcome};
use crate::sources::{SourceError, TemplateProvider, TemplateSelector, TextSource};
use crate::store::{AlignmentStore, CacheEntry, PersistenceError};

/// Errors from the alignment service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Failed to read chapter text: {0}")]
    Source(#[from] SourceError),

    #[error(transparent)]
    Alignment(#[from] AlignmentError),

    #[error("Failed to read stored alignment: {0}")]
    Load(#[source] PersistenceError),

    #[error("Failed to delete stored alignment: {0}")]
    Delete(#[source] PersistenceError),

    /// The alignment was computed; only persisting it failed.
    #[error("Alignment for chapter {} computed but not saved: {source}", .entry.chapter_id)]
    SaveFailed {
        entry: Box<CacheEntry>,
        #[source]
        source: PersistenceError,
    },
}

impl ServiceError {
    /// The computed entry of a failed save, for retrying without recomputing.
    pub fn into_unsaved_entry(self) -> Option<CacheEntry> {
        match self {
            ServiceError::SaveFailed { entry, .. } => Some(*entry),
            _ => None,
        }
    }
}

pub struct AlignmentService {
    texts: Arc<dyn TextSource>,
    templates: Arc<dyn TemplateProvider>,
    controller: Option<AlignmentController>,
    store: Arc<dyn AlignmentStore>,
}

impl AlignmentService {
    pub fn new(
        texts: Arc<dyn TextSource>,
        templates: Arc<dyn TemplateProvider>,
        controller: AlignmentController,
        store: Arc<dyn AlignmentStore>,
    ) -> Self {
        Self {
            texts,
            templates,
            controller: Some(controller),
            store,
        }
    }

    /// Service that aligns missing chapters with the deterministic aligner.
    pub fn offline(
        texts: Arc<dyn TextSource>,
        templates: Arc<dyn TemplateProvider>,
        store: Arc<dyn AlignmentStore>,
    ) -> Self {
        Self {
            texts,
            templates,
            controller: None,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn AlignmentStore> {
        &self.store
    }

    /// Stored alignment for the chapter, computing and saving it when absent.
    pub async fn get_or_align(
        &self,
        chapter_id: &str,
        selector: &TemplateSelector,
    ) -> Result<CacheEntry, ServiceError> {
        if let Some(entry) = self.store.get(chapter_id).await.map_err(ServiceError::Load)? {
            tracing::debug!(chapter_id, method = %entry.method, "Serving stored alignment");
            return Ok(entry);
        }
        self.compute_and_save(chapter_id, selector).await
    }

    /// Delete the stored alignment and compute a fresh one.
    pub async fn regenerate(
        &self,
        chapter_id: &str,
        selector: &TemplateSelector,
    ) -> Result<CacheEntry, ServiceError> {
        let existed = self
            .store
            .delete(chapter_id)
            .await
            .map_err(ServiceError::Delete)?;
        tracing::info!(chapter_id, existed, "Regenerating alignment");
        self.compute_and_save(chapter_id, selector).await
    }

    /// Payload for the rendering layer.
    pub async fn render(
        &self,
        chapter_id: &str,
        selector: &TemplateSelector,
    ) -> Result<RenderPayload, ServiceError> {
        Ok(self.get_or_align(chapter_id, selector).await?.render())
    }

    /// Persist an entry returned by [`ServiceError::SaveFailed`].
    pub async fn save_entry(&self, entry: CacheEntry) -> Result<CacheEntry, ServiceError> {
        match self.store.save(&entry).await {
            Ok(()) => Ok(entry),
            Err(source) => Err(ServiceError::SaveFailed {
                entry: Box::new(entry),
                source,
            }),
        }
    }

    /// Run the controller for a chapter without touching the store.
    pub async fn align_chapter(
        &self,
        chapter_id: &str,
        selector: &TemplateSelector,
    ) -> Result<AlignmentOutcome, ServiceError> {
        let source = self.texts.source_text(chapter_id).await?.unwrap_or_default();
        let target = self.texts.target_text(chapter_id).await?.unwrap_or_default();
        let Some(controller) = &self.controller else {
            return Ok(AlignmentController::align_offline(&source, &target)?);
        };

        let template = self.templates.resolve(selector).await;
        if template.is_none() {
            tracing::warn!(chapter_id, selector = ?selector, "No template resolved");
        }
        let outcome = controller
            .align(&source, &target, template.as_ref())
            .await?;
        Ok(outcome)
    }

    async fn compute_and_save(
        &self,
        chapter_id: &str,
        selector: &TemplateSelector,
    ) -> Result<CacheEntry, ServiceError> {
        let outcome = self.align_chapter(chapter_id, selector).await?;
        tracing::info!(
            chapter_id,
            method = %outcome.method,
            quality_score = outcome.metrics.quality_score,
            "Chapter aligned"
        );
        self.save_entry(CacheEntry::from_outcome(chapter_id, &outcome))
            .await
    }
}
