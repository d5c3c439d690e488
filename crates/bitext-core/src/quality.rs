//! Quality validation for alignments.
//!
//! Two gates decide whether an oracle alignment is accepted:
//! 1. The first-pass gate on coverage and mean confidence
//! 2. Volume integrity: newline-insensitive coverage against a threshold
//!
//! The first gate can pass while a long, confidently-tagged stretch of text
//! is silently missing; volume integrity is the real acceptance criterion.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::patterns::is_line_break;
use crate::types::{AlignmentResult, DEFAULT_CONFIDENCE};

/// Weight of each coverage ratio in the quality score.
pub const COVERAGE_WEIGHT: f64 = 0.3;

/// Weight of mean confidence in the quality score.
pub const CONFIDENCE_WEIGHT: f64 = 0.4;

/// Pairs below this confidence count as misaligned.
pub const MISALIGNMENT_CONFIDENCE: f64 = 0.5;

/// Measured quality of one alignment.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QualityMetrics {
    /// Share of source text reproduced in source segments (0.0 - 1.0)
    pub coverage_source: f64,

    /// Share of target text reproduced in target segments (0.0 - 1.0)
    pub coverage_target: f64,

    /// Mean pair confidence (0.0 - 1.0)
    pub avg_confidence: f64,

    /// Weighted composite, see [`quality_score`]
    pub quality_score: f64,

    pub total_pairs: usize,

    /// Pairs with a blank side or low confidence
    pub misalignment_count: usize,
}

impl QualityMetrics {
    /// Replace the quality score, keeping the measured values.
    pub fn with_quality_score(mut self, score: f64) -> Self {
        self.quality_score = score;
        self
    }
}

/// `0.3·coverage_source + 0.3·coverage_target + 0.4·avg_confidence`.
pub fn quality_score(coverage_source: f64, coverage_target: f64, avg_confidence: f64) -> f64 {
    COVERAGE_WEIGHT * coverage_source
        + COVERAGE_WEIGHT * coverage_target
        + CONFIDENCE_WEIGHT * avg_confidence
}

/// Compute coverage and confidence metrics for an alignment.
pub fn compute_metrics(result: &AlignmentResult, source: &str, target: &str) -> QualityMetrics {
    let source_covered: usize = result.iter().map(|p| char_len(&p.source)).sum();
    let target_covered: usize = result.iter().map(|p| char_len(&p.target)).sum();

    let coverage_source = coverage(source_covered, char_len(source)).min(1.0);
    let coverage_target = coverage(target_covered, char_len(target)).min(1.0);

    let avg_confidence = if result.is_empty() {
        0.0
    } else {
        let total: f64 = result
            .iter()
            .map(|p| {
                if p.confidence.is_nan() {
                    DEFAULT_CONFIDENCE
                } else {
                    p.confidence.clamp(0.0, 1.0)
                }
            })
            .sum();
        total / result.len() as f64
    };

    let misalignment_count = result
        .iter()
        .filter(|p| p.is_unmatched() || p.confidence < MISALIGNMENT_CONFIDENCE)
        .count();

    QualityMetrics {
        coverage_source,
        coverage_target,
        avg_confidence,
        quality_score: quality_score(coverage_source, coverage_target, avg_confidence),
        total_pairs: result.len(),
        misalignment_count,
    }
}

/// Thresholds of the first-pass gate. All comparisons are strict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityGate {
    pub min_coverage_source: f64,
    pub min_coverage_target: f64,
    pub min_avg_confidence: f64,
}

impl Default for QualityGate {
    fn default() -> Self {
        Self {
            min_coverage_source: 0.8,
            min_coverage_target: 0.8,
            min_avg_confidence: 0.6,
        }
    }
}

impl QualityGate {
    pub fn passes(&self, metrics: &QualityMetrics) -> bool {
        self.check(metrics).is_ok()
    }

    /// Check metrics against the gate, describing the first failing bound.
    pub fn check(&self, metrics: &QualityMetrics) -> Result<(), CoverageError> {
        if metrics.coverage_source <= self.min_coverage_source {
            return Err(CoverageError::BelowGate {
                measure: "coverage_source",
                value: metrics.coverage_source,
                minimum: self.min_coverage_source,
            });
        }
        if metrics.coverage_target <= self.min_coverage_target {
            return Err(CoverageError::BelowGate {
                measure: "coverage_target",
                value: metrics.coverage_target,
                minimum: self.min_coverage_target,
            });
        }
        if metrics.avg_confidence <= self.min_avg_confidence {
            return Err(CoverageError::BelowGate {
                measure: "avg_confidence",
                value: metrics.avg_confidence,
                minimum: self.min_avg_confidence,
            });
        }
        Ok(())
    }
}

/// Rejection by one of the quality gates.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoverageError {
    #[error("{measure} {value:.3} not above gate {minimum:.3}")]
    BelowGate {
        measure: &'static str,
        value: f64,
        minimum: f64,
    },

    #[error(
        "volume integrity below {threshold:.2}: source {source_ratio:.4}, target {target_ratio:.4}"
    )]
    VolumeShortfall {
        source_ratio: f64,
        target_ratio: f64,
        threshold: f64,
    },
}

/// Newline-insensitive coverage measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeReport {
    /// Aligned source length / original source length, line breaks removed
    pub source_ratio: f64,

    /// Aligned target length / original target length, line breaks removed
    pub target_ratio: f64,

    pub threshold: f64,
}

impl VolumeReport {
    pub fn passed(&self) -> bool {
        self.source_ratio >= self.threshold && self.target_ratio >= self.threshold
    }

    pub fn into_result(self) -> Result<Self, CoverageError> {
        if self.passed() {
            Ok(self)
        } else {
            Err(CoverageError::VolumeShortfall {
                source_ratio: self.source_ratio,
                target_ratio: self.target_ratio,
                threshold: self.threshold,
            })
        }
    }
}

/// Measure volume integrity at the given threshold.
///
/// Ratios are not clamped: an oracle that fabricates text can exceed 1.0.
pub fn volume_integrity(
    result: &AlignmentResult,
    source: &str,
    target: &str,
    threshold: f64,
) -> VolumeReport {
    let aligned_source: usize = result.iter().map(|p| stripped_len(&p.source)).sum();
    let aligned_target: usize = result.iter().map(|p| stripped_len(&p.target)).sum();

    VolumeReport {
        source_ratio: coverage(aligned_source, stripped_len(source)),
        target_ratio: coverage(aligned_target, stripped_len(target)),
        threshold,
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn stripped_len(text: &str) -> usize {
    text.chars().filter(|c| !is_line_break(*c)).count()
}

/// An empty original counts as fully covered.
fn coverage(covered: usize, total: usize) -> f64 {
    if total == 0 {
        1.0
    } else {
        covered as f64 / total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AlignmentPair, SegmentType};
    use proptest::prelude::*;

    fn pair(source: &str, target: &str, confidence: f64) -> AlignmentPair {
        AlignmentPair::new(source, target, SegmentType::Unknown, confidence)
    }

    #[test]
    fn test_full_coverage() {
        let result = AlignmentResult::new(vec![pair("abcd", "一二", 0.9), pair("ef", "三", 0.7)]);
        let metrics = compute_metrics(&result, "abcdef", "一二三");

        assert_eq!(metrics.coverage_source, 1.0);
        assert_eq!(metrics.coverage_target, 1.0);
        assert!((metrics.avg_confidence - 0.8).abs() < 1e-9);
        assert!((metrics.quality_score - (0.6 + 0.32)).abs() < 1e-9);
        assert_eq!(metrics.total_pairs, 2);
        assert_eq!(metrics.misalignment_count, 0);
    }

    #[test]
    fn test_coverage_measured_in_chars() {
        let result = AlignmentResult::new(vec![pair("При", "你", 0.9)]);
        let metrics = compute_metrics(&result, "Привет", "你好");
        assert!((metrics.coverage_source - 0.5).abs() < 1e-9);
        assert!((metrics.coverage_target - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_fabrication_clamped() {
        let result = AlignmentResult::new(vec![pair("abcdefgh", "一二三四", 0.9)]);
        let metrics = compute_metrics(&result, "abc", "一");
        assert_eq!(metrics.coverage_source, 1.0);
        assert_eq!(metrics.coverage_target, 1.0);
    }

    #[test]
    fn test_misalignments_counted() {
        let result = AlignmentResult::new(vec![
            pair("a", "", 0.9),
            pair("b", "二", 0.3),
            pair("c", "三", 0.9),
        ]);
        let metrics = compute_metrics(&result, "abc", "二三");
        assert_eq!(metrics.misalignment_count, 2);
    }

    #[test]
    fn test_empty_result() {
        let metrics = compute_metrics(&AlignmentResult::default(), "abc", "一");
        assert_eq!(metrics.avg_confidence, 0.0);
        assert_eq!(metrics.coverage_source, 0.0);
        assert_eq!(metrics.total_pairs, 0);
    }

    #[test]
    fn test_gate_is_strict() {
        let gate = QualityGate::default();
        let mut metrics = QualityMetrics {
            coverage_source: 0.9,
            coverage_target: 0.9,
            avg_confidence: 0.7,
            ..Default::default()
        };
        assert!(gate.passes(&metrics));

        metrics.coverage_target = 0.8;
        assert!(matches!(
            gate.check(&metrics),
            Err(CoverageError::BelowGate { measure: "coverage_target", .. })
        ));

        metrics.coverage_target = 0.9;
        metrics.avg_confidence = 0.6;
        assert!(!gate.passes(&metrics));
    }

    #[test]
    fn test_volume_integrity_ignores_line_breaks() {
        let source = "Первая строка.\n\nВторая строка.";
        let target = "第一行。\r\n第二行。";
        let result = AlignmentResult::new(vec![
            pair("Первая строка.", "第一行。", 0.9),
            pair("Вторая строка.", "第二行。", 0.9),
        ]);

        let report = volume_integrity(&result, source, target, 0.98);
        assert_eq!(report.source_ratio, 1.0);
        assert_eq!(report.target_ratio, 1.0);
        assert!(report.passed());
    }

    #[test]
    fn test_volume_integrity_catches_omission() {
        // Passes the first gate yet drops ~15% of the source.
        let source = "a".repeat(85) + &"b".repeat(15);
        let result = AlignmentResult::new(vec![pair(&"a".repeat(85), "一", 0.95)]);

        let metrics = compute_metrics(&result, &source, "一");
        assert!(QualityGate::default().passes(&metrics));

        let report = volume_integrity(&result, &source, "一", 0.95);
        assert!(!report.passed());
        assert!(matches!(
            report.into_result(),
            Err(CoverageError::VolumeShortfall { .. })
        ));
    }

    #[test]
    fn test_volume_ratio_not_clamped() {
        let result = AlignmentResult::new(vec![pair("abcd", "一", 0.9)]);
        let report = volume_integrity(&result, "ab", "一", 0.98);
        assert_eq!(report.source_ratio, 2.0);
        assert!(report.passed());
    }

    proptest! {
        #[test]
        fn prop_score_monotonic(
            cs in 0.0f64..=1.0,
            ct in 0.0f64..=1.0,
            ac in 0.0f64..=1.0,
            delta in 0.0f64..=1.0,
        ) {
            let base = quality_score(cs, ct, ac);
            prop_assert!(quality_score((cs + delta).min(1.0), ct, ac) >= base);
            prop_assert!(quality_score(cs, (ct + delta).min(1.0), ac) >= base);
            prop_assert!(quality_score(cs, ct, (ac + delta).min(1.0)) >= base);
        }

        #[test]
        fn prop_metrics_in_unit_range(
            confidences in proptest::collection::vec(-1.0f64..2.0, 0..20),
            source in "[a-z]{0,50}",
        ) {
            let result = AlignmentResult::new(
                confidences.iter().map(|c| pair("xy", "一", *c)).collect()
            );
            let metrics = compute_metrics(&result, &source, "一二");
            prop_assert!((0.0..=1.0).contains(&metrics.coverage_source));
            prop_assert!((0.0..=1.0).contains(&metrics.coverage_target));
            prop_assert!((0.0..=1.0).contains(&metrics.avg_confidence));
        }
    }
}
