//! # bitext-runtime
//!
//! Oracle-assisted alignment for bitext chapters.
//!
//! The deterministic pieces live in `bitext-core`; this crate adds the parts
//! that talk to the outside world:
//! - Providers for chat-completion oracles
//! - The retry/relaxation controller with its fallback path
//! - Text and template sources
//! - Alignment stores (in memory, SQLite, and a cached wrapper)
//!
//! ## Example
//!
//! ```rust,ignore
//! use bitext_runtime::{
//!     AlignmentController, AlignmentService, DirectoryTextSource, EngineConfig,
//!     ProviderRegistry, SqliteAlignmentStore, TemplateLibrary, TemplateSelector,
//! };
//!
//! let config = EngineConfig::from_file("bitext.yaml")?;
//! let provider = ProviderRegistry::with_defaults()
//!     .create(&config.model.provider, &config.model.provider_config())?;
//! let service = AlignmentService::new(
//!     Arc::new(DirectoryTextSource::new("chapters")),
//!     Arc::new(TemplateLibrary::with_builtin()),
//!     AlignmentController::new(provider, config),
//!     Arc::new(SqliteAlignmentStore::open("alignments.db")?),
//! );
//!
//! let payload = service
//!     .render("ch-01", &TemplateSelector::Novel("novel-7".into()))
//!     .await?;
//! ```

pub mod config;
pub mod controller;
pub mod prompts;
pub mod providers;
pub mod resilience;
pub mod service;
pub mod sources;
pub mod store;

pub use config::{
    BudgetConfig, CacheConfig, ConfigError, EngineConfig, ModelConfig, RelaxationSchedule,
    RetryConfig, RetryPromptPolicy,
};
pub use controller::{
    AlignmentController, AlignmentError, AlignmentOutcome, AttemptOutcome, AttemptRecord,
};
pub use providers::{LlmProvider, ProviderError, ProviderFactory, ProviderRegistry};
pub use resilience::{FallbackReason, LlmUsage, RetryBackoff, TokenBudget};
pub use service::{AlignmentService, ServiceError};
pub use sources::{
    DirectoryTextSource, MemoryTextSource, SourceError, TemplateLibrary, TemplateProvider,
    TemplateSelector, TextSource,
};
pub use store::{
    AlignmentStore, CacheEntry, CachedAlignmentStore, MemoryAlignmentStore, PersistenceError,
    SqliteAlignmentStore,
};
