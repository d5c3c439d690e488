//! Resilience patterns for bitext-runtime.
//!
//! This module provides:
//! - Per-alignment token budget and usage accounting
//! - Pause between attempts via `backon`
//! - The reasons an alignment ends on the fallback aligner

mod backoff;
mod budget;
mod fallback;

pub use backoff::RetryBackoff;
pub use budget::{LlmUsage, TokenBudget};
pub use fallback::FallbackReason;
