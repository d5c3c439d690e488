//! # bitext-core
//!
//! Deterministic building blocks for aligning a chapter with its
//! independently produced translation.
//!
//! This crate never calls an oracle. It provides:
//! - Prompt rendering from alignment templates
//! - Parsing of oracle output into alignment pairs
//! - Quality metrics and the two acceptance gates
//! - A total, deterministic fallback aligner
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: Same input always produces same output
//! 2. **Total fallback**: [`fallback_align`] never fails, for any input
//! 3. **Bounded metrics**: coverage and confidence stay within `[0, 1]`
//!
//! ## Example
//!
//! ```rust
//! use bitext_core::{compute_metrics, fallback_align};
//!
//! let source = "Он открыл дверь. Внутри было темно.";
//! let target = "他打开了门。里面很黑。";
//!
//! let result = fallback_align(source, target);
//! assert_eq!(result.len(), 2);
//!
//! let metrics = compute_metrics(&result, source, target);
//! assert!(metrics.coverage_target > 0.9);
//! ```

pub mod fallback;
pub mod patterns;
pub mod quality;
pub mod response;
pub mod segment;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use fallback::{
    fallback_align, monolingual_alignment, FALLBACK_CONFIDENCE, FALLBACK_QUALITY_SCORE,
};
pub use quality::{
    compute_metrics, quality_score, volume_integrity, CoverageError, QualityGate, QualityMetrics,
    VolumeReport,
};
pub use response::{parse_response, ParseError, ParseStrategy};
pub use segment::{split_paragraphs, split_sentences};
pub use template::{AlignmentTemplate, TemplateError, TemplateLoadError};
pub use types::{
    AlignmentMethod, AlignmentPair, AlignmentResult, RenderPayload, RenderedPair, SegmentType,
};
