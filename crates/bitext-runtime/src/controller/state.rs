//! States of one alignment run and the pure transitions between them.

use bitext_core::{
    compute_metrics, volume_integrity, AlignmentResult, CoverageError, ParseError, QualityGate,
    QualityMetrics,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::config::RelaxationSchedule;
use crate::providers::ProviderError;
use crate::resilience::FallbackReason;

use super::AlignmentError;

/// A parsed oracle answer awaiting or past validation.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub result: AlignmentResult,
    pub metrics: QualityMetrics,
    pub model: String,
}

/// Why an attempt produced no usable alignment before coverage checks.
#[derive(Error, Debug)]
pub enum AttemptFailure {
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),

    #[error("unparseable response: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug)]
pub enum State {
    Init,
    Attempting(u32),
    ParseFailed {
        attempt: u32,
        failure: AttemptFailure,
    },
    CoverageFailed {
        attempt: u32,
        error: CoverageError,
        coverage: (f64, f64),
    },
    Validated {
        attempt: u32,
        candidate: Box<Candidate>,
    },
    Success {
        attempt: u32,
        candidate: Box<Candidate>,
    },
    Monolingual,
    Fallback(FallbackReason),
}

impl State {
    pub fn name(&self) -> &'static str {
        match self {
            State::Init => "init",
            State::Attempting(_) => "attempting",
            State::ParseFailed { .. } => "parse_failed",
            State::CoverageFailed { .. } => "coverage_failed",
            State::Validated { .. } => "validated",
            State::Success { .. } => "success",
            State::Monolingual => "monolingual",
            State::Fallback(_) => "fallback",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            State::Success { .. } | State::Monolingual | State::Fallback(_)
        )
    }
}

/// How one attempt ended, as recorded in the outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Accepted,
    AdapterFailed { message: String },
    TimedOut,
    Unparseable { message: String },
    GateRejected { message: String },
    VolumeShortfall,
}

/// One oracle attempt with the threshold it was judged against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub threshold: f64,
    pub outcome: AttemptOutcome,
    pub coverage_source: Option<f64>,
    pub coverage_target: Option<f64>,
}

impl AttemptRecord {
    pub fn is_accepted(&self) -> bool {
        self.outcome == AttemptOutcome::Accepted
    }
}

/// Input checks before any oracle call. `Ok(None)` means proceed.
pub fn screen_inputs(source: &str, target: &str) -> Result<Option<State>, AlignmentError> {
    if target.trim().is_empty() {
        return Err(AlignmentError::NothingToAlign);
    }
    if source.trim().is_empty() {
        return Ok(Some(State::Monolingual));
    }
    Ok(None)
}

/// Next state after a failed attempt.
pub fn retry_or_fallback(attempt: u32, schedule: &RelaxationSchedule) -> State {
    if attempt < schedule.attempts() {
        State::Attempting(attempt + 1)
    } else {
        State::Fallback(FallbackReason::AttemptsExhausted { attempts: attempt })
    }
}

/// Score a parsed result and apply the first-pass gate.
pub fn gate_parsed(
    attempt: u32,
    result: AlignmentResult,
    model: String,
    source: &str,
    target: &str,
    gate: &QualityGate,
) -> State {
    let metrics = compute_metrics(&result, source, target);
    match gate.check(&metrics) {
        Ok(()) => State::Validated {
            attempt,
            candidate: Box::new(Candidate {
                result,
                metrics,
                model,
            }),
        },
        Err(error) => State::CoverageFailed {
            attempt,
            error,
            coverage: (metrics.coverage_source, metrics.coverage_target),
        },
    }
}

/// Apply volume integrity at the attempt's threshold.
pub fn check_volume(
    attempt: u32,
    candidate: Box<Candidate>,
    source: &str,
    target: &str,
    threshold: f64,
) -> State {
    let report = volume_integrity(&candidate.result, source, target, threshold);
    let coverage = (report.source_ratio, report.target_ratio);
    match report.into_result() {
        Ok(_) => State::Success { attempt, candidate },
        Err(error) => State::CoverageFailed {
            attempt,
            error,
            coverage,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bitext_core::{AlignmentPair, SegmentType};

    fn pair(source: &str, target: &str, confidence: f64) -> AlignmentPair {
        AlignmentPair::new(source, target, SegmentType::Unknown, confidence)
    }

    #[test]
    fn test_screen_inputs() {
        assert!(matches!(
            screen_inputs("Текст.", "  \n"),
            Err(AlignmentError::NothingToAlign)
        ));
        assert!(matches!(
            screen_inputs("", "Para."),
            Ok(Some(State::Monolingual))
        ));
        assert!(matches!(screen_inputs("a", "b"), Ok(None)));
    }

    #[test]
    fn test_retry_until_schedule_ends() {
        let schedule = RelaxationSchedule::default();
        assert!(matches!(
            retry_or_fallback(1, &schedule),
            State::Attempting(2)
        ));
        assert!(matches!(
            retry_or_fallback(2, &schedule),
            State::Attempting(3)
        ));
        assert!(matches!(
            retry_or_fallback(3, &schedule),
            State::Fallback(FallbackReason::AttemptsExhausted { attempts: 3 })
        ));
    }

    #[test]
    fn test_gate_rejects_low_confidence() {
        let result = AlignmentResult::new(vec![pair("Да.", "是。", 0.3)]);
        let state = gate_parsed(
            1,
            result,
            "m".to_string(),
            "Да.",
            "是。",
            &QualityGate::default(),
        );
        assert!(matches!(
            state,
            State::CoverageFailed {
                error: CoverageError::BelowGate {
                    measure: "avg_confidence",
                    ..
                },
                ..
            }
        ));
    }

    #[test]
    fn test_volume_decides_success() {
        let source = "Один. Два. Три. Четыре.";
        let target = "一。二。三。四。";
        let partial = AlignmentResult::new(vec![
            pair("Один. Два. Три.", "一。二。三。", 0.9),
        ]);

        let state = gate_parsed(1, partial, "m".to_string(), source, target, &QualityGate {
            min_coverage_source: 0.5,
            min_coverage_target: 0.5,
            min_avg_confidence: 0.5,
        });
        let candidate = match state {
            State::Validated { candidate, .. } => candidate,
            other => panic!("expected validated, got {}", other.name()),
        };

        let state = check_volume(1, candidate, source, target, 0.98);
        assert!(matches!(
            state,
            State::CoverageFailed {
                error: CoverageError::VolumeShortfall { .. },
                ..
            }
        ));
    }

    #[test]
    fn test_terminal_states() {
        assert!(State::Monolingual.is_terminal());
        assert!(State::Fallback(FallbackReason::NoTemplate).is_terminal());
        assert!(!State::Attempting(1).is_terminal());
        assert!(!State::Init.is_terminal());
    }
}
