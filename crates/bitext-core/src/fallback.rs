//! Deterministic alignment without an oracle.
//!
//! The fallback aligner is a total function: any pair of inputs, including
//! empty ones, yields a result. Sentences are paired positionally and every
//! pair gets the same flat confidence because nothing is verified
//! semantically.

use crate::segment::{split_paragraphs, split_sentences};
use crate::types::{AlignmentPair, AlignmentResult, SegmentType, DEFAULT_CONFIDENCE};

/// Confidence given to every positional pair.
pub const FALLBACK_CONFIDENCE: f64 = DEFAULT_CONFIDENCE;

/// Quality score reported for fallback alignments, whatever the measured coverage.
pub const FALLBACK_QUALITY_SCORE: f64 = 0.5;

/// Confidence of monolingual pairs: there is nothing to mismatch.
pub const MONOLINGUAL_CONFIDENCE: f64 = 1.0;

/// Pair the i-th source sentence with the i-th target sentence.
///
/// Surplus sentences on the longer side become unmatched pairs with the
/// other side left empty. Input that is non-empty but holds no sentence
/// (only whitespace) yields a single blank pair.
pub fn fallback_align(source: &str, target: &str) -> AlignmentResult {
    let source_sentences = split_sentences(source);
    let target_sentences = split_sentences(target);
    let total = source_sentences.len().max(target_sentences.len());

    if total == 0 {
        if source.is_empty() && target.is_empty() {
            return AlignmentResult::default();
        }
        return AlignmentResult::new(vec![AlignmentPair::new(
            String::new(),
            String::new(),
            SegmentType::Unknown,
            FALLBACK_CONFIDENCE,
        )]);
    }

    let mut source_iter = source_sentences.into_iter();
    let mut target_iter = target_sentences.into_iter();

    let pairs = (0..total)
        .map(|_| {
            let source = source_iter.next().unwrap_or_default();
            let target = target_iter.next().unwrap_or_default();
            let segment_type = if source.is_empty() {
                SegmentType::guess(&target)
            } else {
                SegmentType::guess(&source)
            };
            AlignmentPair::new(source, target, segment_type, FALLBACK_CONFIDENCE)
        })
        .collect();

    AlignmentResult::new(pairs)
}

/// Degenerate alignment for chapters with no source text.
///
/// Each target paragraph becomes its own pair with an empty source side.
pub fn monolingual_alignment(target: &str) -> AlignmentResult {
    let pairs = split_paragraphs(target)
        .into_iter()
        .map(|paragraph| {
            let segment_type = SegmentType::guess(&paragraph);
            AlignmentPair::new(String::new(), paragraph, segment_type, MONOLINGUAL_CONFIDENCE)
        })
        .collect();

    AlignmentResult::new(pairs)
}
