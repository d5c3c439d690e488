//! Retry/relaxation controller.
//!
//! Drives one chapter through the oracle:
//! - Renders the prompt, calls the provider under a timeout
//! - Parses and scores the answer, then applies volume integrity at the
//!   threshold of the current attempt
//! - Retries with a relaxed threshold, and ends on the deterministic
//!   aligner when the schedule or the token budget runs out
//!
//! Nothing past input screening is fatal: every run ends in `Success`,
//! `Monolingual` or `Fallback`.

mod state;

pub use state::{AttemptFailure, AttemptOutcome, AttemptRecord};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use bitext_core::{
    compute_metrics, fallback_align, monolingual_alignment, parse_response, AlignmentMethod,
    AlignmentResult, AlignmentTemplate, CoverageError, QualityMetrics, FALLBACK_QUALITY_SCORE,
};

use crate::config::{EngineConfig, RetryPromptPolicy};
use crate::prompts;
use crate::providers::LlmProvider;
use crate::resilience::{FallbackReason, LlmUsage, TokenBudget};

use state::{Candidate, State};

/// The only error that ends an alignment request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignmentError {
    #[error("target text is empty, nothing to align")]
    NothingToAlign,
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct AlignmentOutcome {
    pub result: AlignmentResult,
    pub metrics: QualityMetrics,
    pub method: AlignmentMethod,
    pub attempts: Vec<AttemptRecord>,
    pub model_used: Option<String>,
    pub template_used: Option<String>,
    pub usage: LlmUsage,
    pub fallback_reason: Option<FallbackReason>,
}

/// Per-run context threaded through the transitions.
struct Run<'a> {
    source: &'a str,
    target: &'a str,
    template: Option<&'a AlignmentTemplate>,
    prompt: String,
    shortfall: Option<(f64, f64)>,
    delays: Vec<Duration>,
    budget: TokenBudget,
    usage: LlmUsage,
    attempts: Vec<AttemptRecord>,
}

impl<'a> Run<'a> {
    fn new(
        source: &'a str,
        target: &'a str,
        template: Option<&'a AlignmentTemplate>,
        config: &EngineConfig,
    ) -> Self {
        let retries = config.relaxation.attempts().saturating_sub(1) as usize;
        let budget = match config.budget.max_tokens_per_alignment {
            Some(max) => TokenBudget::new(max),
            None => TokenBudget::unlimited(),
        };
        Self {
            source,
            target,
            template,
            prompt: String::new(),
            shortfall: None,
            delays: config.retry.backoff.delays(retries),
            budget,
            usage: LlmUsage::default(),
            attempts: Vec::new(),
        }
    }

    fn record(
        &mut self,
        attempt: u32,
        threshold: f64,
        outcome: AttemptOutcome,
        coverage: Option<(f64, f64)>,
    ) {
        self.attempts.push(AttemptRecord {
            attempt,
            threshold,
            outcome,
            coverage_source: coverage.map(|c| c.0),
            coverage_target: coverage.map(|c| c.1),
        });
    }

    fn template_id(&self) -> Option<String> {
        self.template.map(|t| t.id.clone())
    }

    fn finish(self, state: State) -> AlignmentOutcome {
        match state {
            State::Success { attempt, candidate } => {
                tracing::debug!(attempt, "Oracle alignment accepted");
                let Candidate {
                    result,
                    metrics,
                    model,
                } = *candidate;
                AlignmentOutcome {
                    result,
                    metrics,
                    method: AlignmentMethod::Llm,
                    model_used: Some(model),
                    template_used: self.template_id(),
                    attempts: self.attempts,
                    usage: self.usage,
                    fallback_reason: None,
                }
            }
            State::Monolingual => {
                let result = monolingual_alignment(self.target);
                let metrics = compute_metrics(&result, "", self.target);
                AlignmentOutcome {
                    result,
                    metrics,
                    method: AlignmentMethod::Monolingual,
                    model_used: None,
                    template_used: None,
                    attempts: self.attempts,
                    usage: self.usage,
                    fallback_reason: None,
                }
            }
            State::Fallback(reason) => self.finish_fallback(reason),
            other => {
                // Unreachable through `align`; treated as a fallback so the run still ends.
                tracing::error!(state = other.name(), "Run finished in a non-terminal state");
                let attempts = self.attempts.len() as u32;
                self.finish_fallback(FallbackReason::AttemptsExhausted { attempts })
            }
        }
    }

    fn finish_fallback(self, reason: FallbackReason) -> AlignmentOutcome {
        let result = fallback_align(self.source, self.target);
        let metrics = compute_metrics(&result, self.source, self.target)
            .with_quality_score(FALLBACK_QUALITY_SCORE);
        AlignmentOutcome {
            result,
            metrics,
            method: AlignmentMethod::RegexFallback,
            model_used: None,
            template_used: self.template_id(),
            attempts: self.attempts,
            usage: self.usage,
            fallback_reason: Some(reason),
        }
    }
}

/// Runs the attempt loop against one provider.
pub struct AlignmentController {
    provider: Arc<dyn LlmProvider>,
    config: EngineConfig,
}

impl AlignmentController {
    pub fn new(provider: Arc<dyn LlmProvider>, config: EngineConfig) -> Self {
        Self { provider, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Align one chapter.
    ///
    /// Returns `Err` only for an empty target text.
    pub async fn align(
        &self,
        source: &str,
        target: &str,
        template: Option<&AlignmentTemplate>,
    ) -> Result<AlignmentOutcome, AlignmentError> {
        let mut run = Run::new(source, target, template, &self.config);
        let mut state = State::Init;

        while !state.is_terminal() {
            let from = state.name();
            state = match state {
                State::Init => self.on_init(&mut run)?,
                State::Attempting(attempt) => self.on_attempting(&mut run, attempt).await,
                State::ParseFailed { attempt, failure } => {
                    self.on_parse_failed(&mut run, attempt, failure)
                }
                State::CoverageFailed {
                    attempt,
                    error,
                    coverage,
                } => self.on_coverage_failed(&mut run, attempt, error, coverage),
                State::Validated { attempt, candidate } => {
                    self.on_validated(&mut run, attempt, candidate)
                }
                terminal => terminal,
            };
            tracing::trace!(from, to = state.name(), "Controller transition");
        }

        let outcome = run.finish(state);
        tracing::info!(
            method = %outcome.method,
            attempts = outcome.attempts.len(),
            quality_score = outcome.metrics.quality_score,
            pairs = outcome.result.len(),
            "Alignment finished"
        );
        Ok(outcome)
    }

    /// Align without the oracle; same input screening as [`align`](Self::align).
    pub fn align_offline(source: &str, target: &str) -> Result<AlignmentOutcome, AlignmentError> {
        let config = EngineConfig::default();
        let run = Run::new(source, target, None, &config);
        let state = state::screen_inputs(source, target)?
            .unwrap_or(State::Fallback(FallbackReason::Offline));
        Ok(run.finish(state))
    }

    fn on_init(&self, run: &mut Run<'_>) -> Result<State, AlignmentError> {
        if let Some(state) = state::screen_inputs(run.source, run.target)? {
            return Ok(state);
        }

        let Some(template) = run.template else {
            tracing::warn!("No alignment template configured, using fallback aligner");
            return Ok(State::Fallback(FallbackReason::NoTemplate));
        };

        match template.render(run.source, run.target) {
            Ok(prompt) => {
                run.prompt = prompt;
                Ok(State::Attempting(1))
            }
            Err(e) => {
                tracing::warn!(
                    template_id = %template.id,
                    error = %e,
                    "Template does not render, using fallback aligner"
                );
                Ok(State::Fallback(FallbackReason::TemplateUnrenderable {
                    message: e.to_string(),
                }))
            }
        }
    }

    async fn on_attempting(&self, run: &mut Run<'_>, attempt: u32) -> State {
        // Present whenever on_init reached Attempting
        let Some(template) = run.template else {
            return State::Fallback(FallbackReason::NoTemplate);
        };
        let threshold = self.threshold(attempt);

        let prompt = match (self.config.retry.prompt_policy, run.shortfall) {
            (RetryPromptPolicy::ReportShortfall, Some((source_ratio, target_ratio))) => format!(
                "{}{}",
                run.prompt,
                prompts::shortfall_note(source_ratio, target_ratio, threshold)
            ),
            _ => run.prompt.clone(),
        };
        let system = template.system_prompt.as_deref();

        let estimate = self
            .provider
            .estimate_tokens(&prompt)
            .saturating_add(system.map(|s| self.provider.estimate_tokens(s)).unwrap_or(0));
        if !run.budget.can_afford(estimate) {
            tracing::warn!(
                attempt,
                estimate,
                remaining = run.budget.remaining(),
                "Token budget exhausted, using fallback aligner"
            );
            return State::Fallback(FallbackReason::BudgetExhausted {
                attempts: attempt - 1,
                remaining: run.budget.remaining(),
            });
        }

        if attempt > 1 {
            if let Some(delay) = run.delays.get(attempt as usize - 2).copied() {
                if !delay.is_zero() {
                    tracing::debug!(attempt, delay = ?delay, "Pausing before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }

        tracing::debug!(
            attempt,
            threshold,
            provider = self.provider.name(),
            template_id = %template.id,
            "Calling oracle"
        );

        let completion = self.config.completion_config(template);
        let timeout = self.config.request_timeout;
        let call = self.provider.generate(system, &prompt, &completion);

        let response = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                run.usage.record_failure();
                run.budget.record(estimate);
                return State::ParseFailed {
                    attempt,
                    failure: AttemptFailure::Provider(e),
                };
            }
            Err(_) => {
                run.usage.record_failure();
                run.budget.record(estimate);
                return State::ParseFailed {
                    attempt,
                    failure: AttemptFailure::Timeout(timeout),
                };
            }
        };

        run.usage.add(&response.usage);
        let spent = match response.usage.total() {
            0 => estimate.saturating_add(self.provider.estimate_tokens(&response.content)),
            reported => reported,
        };
        run.budget.record(spent);

        match parse_response(&response.content) {
            Ok(result) => state::gate_parsed(
                attempt,
                result,
                response.model,
                run.source,
                run.target,
                &self.config.gate,
            ),
            Err(e) => State::ParseFailed {
                attempt,
                failure: AttemptFailure::Parse(e),
            },
        }
    }

    fn on_parse_failed(&self, run: &mut Run<'_>, attempt: u32, failure: AttemptFailure) -> State {
        let threshold = self.threshold(attempt);
        tracing::warn!(attempt, threshold, error = %failure, "Alignment attempt failed");

        let outcome = match &failure {
            AttemptFailure::Provider(e) => AttemptOutcome::AdapterFailed {
                message: e.to_string(),
            },
            AttemptFailure::Timeout(_) => AttemptOutcome::TimedOut,
            AttemptFailure::Parse(e) => AttemptOutcome::Unparseable {
                message: e.to_string(),
            },
        };
        run.record(attempt, threshold, outcome, None);
        state::retry_or_fallback(attempt, &self.config.relaxation)
    }

    fn on_coverage_failed(
        &self,
        run: &mut Run<'_>,
        attempt: u32,
        error: CoverageError,
        coverage: (f64, f64),
    ) -> State {
        let threshold = self.threshold(attempt);
        tracing::warn!(
            attempt,
            threshold,
            coverage_source = coverage.0,
            coverage_target = coverage.1,
            error = %error,
            "Alignment rejected by quality gate"
        );

        let outcome = match &error {
            CoverageError::BelowGate { measure, .. } => {
                // A confidence rejection says nothing about missing text
                if *measure != "avg_confidence" {
                    run.shortfall = Some(coverage);
                }
                AttemptOutcome::GateRejected {
                    message: error.to_string(),
                }
            }
            CoverageError::VolumeShortfall { .. } => {
                run.shortfall = Some(coverage);
                AttemptOutcome::VolumeShortfall
            }
        };

        run.record(attempt, threshold, outcome, Some(coverage));
        state::retry_or_fallback(attempt, &self.config.relaxation)
    }

    fn on_validated(&self, run: &mut Run<'_>, attempt: u32, candidate: Box<Candidate>) -> State {
        let threshold = self.threshold(attempt);
        let coverage = (
            candidate.metrics.coverage_source,
            candidate.metrics.coverage_target,
        );

        let next = state::check_volume(attempt, candidate, run.source, run.target, threshold);
        if let State::Success { .. } = next {
            run.record(attempt, threshold, AttemptOutcome::Accepted, Some(coverage));
        }
        next
    }

    fn threshold(&self, attempt: u32) -> f64 {
        self.config
            .relaxation
            .threshold(attempt)
            .unwrap_or_else(|| self.config.relaxation.thresholds().last().copied().unwrap_or(1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        ChatMessage, CompletionConfig, CompletionResponse, ProviderError, TokenUsage,
    };
    use crate::resilience::RetryBackoff;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    const SOURCE: &str = "Он открыл дверь.\nВнутри было темно.";
    const TARGET: &str = "他打开了门。\n里面很黑。";
    const GOOD: &str = r#"{"alignments": [
        {"ru": "Он открыл дверь.", "zh": "他打开了门。", "type": "action", "confidence": 0.95},
        {"ru": "Внутри было темно.", "zh": "里面很黑。", "type": "description", "confidence": 0.9}
    ]}"#;
    const PARTIAL: &str = r#"{"alignments": [
        {"ru": "Он открыл дверь.", "zh": "他打开了门。", "confidence": 0.95}
    ]}"#;

    /// Replays scripted answers, then repeats the last one.
    struct ScriptedProvider {
        answers: Mutex<VecDeque<Result<String, ProviderError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedProvider {
        fn new(answers: Vec<Result<&str, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                answers: Mutex::new(
                    answers
                        .into_iter()
                        .map(|a| a.map(str::to_string))
                        .collect(),
                ),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.prompts.lock().len()
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            let user = messages.last().map(|m| m.content.clone()).unwrap_or_default();
            self.prompts.lock().push(user);
            let answer = {
                let mut answers = self.answers.lock();
                if answers.len() > 1 {
                    answers.pop_front()
                } else {
                    answers.front().map(|a| match a {
                        Ok(text) => Ok(text.clone()),
                        Err(_) => Err(ProviderError::EmptyCompletion),
                    })
                }
            };
            let content = answer.unwrap_or(Err(ProviderError::EmptyCompletion))?;
            Ok(CompletionResponse {
                content,
                usage: TokenUsage {
                    prompt_tokens: 100,
                    completion_tokens: 50,
                },
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct SlowProvider;

    #[async_trait]
    impl LlmProvider for SlowProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::EmptyCompletion)
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    fn config() -> EngineConfig {
        EngineConfig::default().with_backoff(RetryBackoff::immediate())
    }

    fn controller(provider: Arc<dyn LlmProvider>, config: EngineConfig) -> AlignmentController {
        AlignmentController::new(provider, config)
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let provider = ScriptedProvider::new(vec![Ok(GOOD)]);
        let template = prompts::default_template();
        let outcome = controller(provider.clone(), config())
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        assert_eq!(outcome.method, AlignmentMethod::Llm);
        assert_eq!(outcome.result.len(), 2);
        assert_eq!(outcome.attempts.len(), 1);
        assert!(outcome.attempts[0].is_accepted());
        assert_eq!(outcome.attempts[0].threshold, 0.98);
        assert_eq!(outcome.model_used.as_deref(), Some("deepseek-chat"));
        assert_eq!(outcome.template_used.as_deref(), Some(template.id.as_str()));
        assert_eq!(outcome.usage.total_tokens, 150);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn test_retry_after_garbage_then_success() {
        let provider = ScriptedProvider::new(vec![
            Ok("Sorry, I cannot help with that."),
            Err(ProviderError::RateLimited { retry_after: None }),
            Ok(GOOD),
        ]);
        let template = prompts::default_template();
        let outcome = controller(provider.clone(), config())
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        assert_eq!(outcome.method, AlignmentMethod::Llm);
        assert_eq!(provider.calls(), 3);
        assert!(matches!(
            outcome.attempts[0].outcome,
            AttemptOutcome::Unparseable { .. }
        ));
        assert!(matches!(
            outcome.attempts[1].outcome,
            AttemptOutcome::AdapterFailed { .. }
        ));
        assert_eq!(outcome.attempts[2].threshold, 0.95);
        assert_eq!(outcome.usage.failed_calls, 1);
    }

    #[tokio::test]
    async fn test_partial_answers_exhaust_schedule() {
        let provider = ScriptedProvider::new(vec![Ok(PARTIAL)]);
        let template = prompts::default_template();
        let outcome = controller(provider.clone(), config())
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        assert_eq!(outcome.method, AlignmentMethod::RegexFallback);
        assert_eq!(outcome.metrics.quality_score, 0.5);
        assert_eq!(provider.calls(), 3);
        assert_eq!(
            outcome.fallback_reason,
            Some(FallbackReason::AttemptsExhausted { attempts: 3 })
        );
        let thresholds: Vec<f64> = outcome.attempts.iter().map(|a| a.threshold).collect();
        assert_eq!(thresholds, vec![0.98, 0.96, 0.95]);
    }

    #[tokio::test]
    async fn test_relaxed_threshold_admits_same_answer() {
        // 97 of 100 characters on each side once line breaks are stripped
        let source_kept = "Он шёл домой. ".repeat(7).trim_end().to_string();
        let target_kept = format!("{}嗯", "他走回了家。".repeat(16));
        let source = format!("{}\nВсё", source_kept);
        let target = format!("{}\n结束了", target_kept);
        let answer = serde_json::json!({
            "alignments": [{"ru": source_kept, "zh": target_kept, "confidence": 0.9}]
        })
        .to_string();

        let provider = ScriptedProvider::new(vec![Ok(answer.as_str())]);
        let template = prompts::default_template();
        let outcome = controller(provider.clone(), config())
            .align(&source, &target, Some(&template))
            .await
            .unwrap();

        assert_eq!(outcome.method, AlignmentMethod::Llm);
        assert_eq!(provider.calls(), 2);
        assert_eq!(outcome.attempts[0].outcome, AttemptOutcome::VolumeShortfall);
        assert_eq!(outcome.attempts[0].threshold, 0.98);
        let first = &outcome.attempts[0];
        let (source_ratio, target_ratio) =
            first.coverage_source.zip(first.coverage_target).unwrap();
        assert!((source_ratio - 0.97).abs() < 1e-9);
        assert!((target_ratio - 0.97).abs() < 1e-9);
        assert_eq!(outcome.attempts[1].threshold, 0.96);
        assert!(outcome.attempts[1].is_accepted());
    }

    #[tokio::test]
    async fn test_huge_usage_report_is_not_fatal() {
        struct GreedyProvider;

        #[async_trait]
        impl LlmProvider for GreedyProvider {
            async fn complete(
                &self,
                _messages: Vec<ChatMessage>,
                config: &CompletionConfig,
            ) -> Result<CompletionResponse, ProviderError> {
                Ok(CompletionResponse {
                    content: GOOD.to_string(),
                    usage: TokenUsage {
                        prompt_tokens: u32::MAX,
                        completion_tokens: 1,
                    },
                    model: config.model.clone(),
                    stop_reason: None,
                })
            }

            fn name(&self) -> &str {
                "greedy"
            }
        }

        let template = prompts::default_template();
        let outcome = controller(Arc::new(GreedyProvider), config())
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        assert_eq!(outcome.method, AlignmentMethod::Llm);
        assert_eq!(outcome.usage.total_tokens, u32::MAX);
        assert_eq!(outcome.usage.prompt_tokens, u32::MAX);
    }

    #[tokio::test]
    async fn test_report_shortfall_appends_note() {
        let provider = ScriptedProvider::new(vec![Ok(PARTIAL), Ok(GOOD)]);
        let template = prompts::default_template();
        let config = config().with_prompt_policy(RetryPromptPolicy::ReportShortfall);
        let outcome = controller(provider.clone(), config)
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        assert_eq!(outcome.method, AlignmentMethod::Llm);
        let prompts = provider.prompts.lock();
        assert!(!prompts[0].contains("previous answer"));
        assert!(prompts[1].contains("previous answer"));
        assert!(prompts[1].contains("96.0%"));
    }

    #[tokio::test]
    async fn test_identical_policy_resends_prompt() {
        let provider = ScriptedProvider::new(vec![Ok(PARTIAL), Ok(GOOD)]);
        let template = prompts::default_template();
        controller(provider.clone(), config())
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        let prompts = provider.prompts.lock();
        assert_eq!(prompts[0], prompts[1]);
    }

    #[tokio::test]
    async fn test_no_template_falls_back_without_calls() {
        let provider = ScriptedProvider::new(vec![Ok(GOOD)]);
        let outcome = controller(provider.clone(), config())
            .align(SOURCE, TARGET, None)
            .await
            .unwrap();

        assert_eq!(outcome.method, AlignmentMethod::RegexFallback);
        assert_eq!(outcome.fallback_reason, Some(FallbackReason::NoTemplate));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_unrenderable_template_falls_back() {
        let provider = ScriptedProvider::new(vec![Ok(GOOD)]);
        let mut template = prompts::default_template();
        template.alignment_prompt_template = "{source_text} {target_text} {chapter_title}".to_string();

        let outcome = controller(provider.clone(), config())
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        assert!(matches!(
            outcome.fallback_reason,
            Some(FallbackReason::TemplateUnrenderable { .. })
        ));
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_target_is_error() {
        let provider = ScriptedProvider::new(vec![Ok(GOOD)]);
        let result = controller(provider, config())
            .align(SOURCE, "", Some(&prompts::default_template()))
            .await;
        assert!(matches!(result, Err(AlignmentError::NothingToAlign)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeouts_count_as_failures() {
        let template = prompts::default_template();
        let config = config().with_request_timeout(Duration::from_secs(5));
        let outcome = controller(Arc::new(SlowProvider), config)
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        assert_eq!(outcome.method, AlignmentMethod::RegexFallback);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(outcome
            .attempts
            .iter()
            .all(|a| a.outcome == AttemptOutcome::TimedOut));
    }

    #[tokio::test]
    async fn test_budget_stops_retries() {
        let provider = ScriptedProvider::new(vec![Ok(PARTIAL)]);
        let template = prompts::default_template();
        let estimate = provider.estimate_tokens(&template.render(SOURCE, TARGET).unwrap())
            + provider.estimate_tokens(template.system_prompt.as_deref().unwrap_or_default());
        // Covers the first prompt; the 150 tokens it reports leave too little for a second
        let config = config().with_token_budget(Some(estimate + 100));

        let outcome = controller(provider.clone(), config)
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert!(matches!(
            outcome.fallback_reason,
            Some(FallbackReason::BudgetExhausted { attempts: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_pauses_between_attempts() {
        let provider = ScriptedProvider::new(vec![Ok("nope")]);
        let template = prompts::default_template();
        let config = config().with_backoff(RetryBackoff::exponential(
            Duration::from_secs(2),
            Duration::from_secs(10),
        ));

        let started = tokio::time::Instant::now();
        controller(provider, config)
            .align(SOURCE, TARGET, Some(&template))
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_secs(6));
    }

    #[test]
    fn test_offline_alignment() {
        let outcome = AlignmentController::align_offline(SOURCE, TARGET).unwrap();
        assert_eq!(outcome.method, AlignmentMethod::RegexFallback);
        assert_eq!(outcome.fallback_reason, Some(FallbackReason::Offline));
        assert!(outcome.attempts.is_empty());

        let mono = AlignmentController::align_offline("", "Один.\n\nДва.").unwrap();
        assert_eq!(mono.method, AlignmentMethod::Monolingual);
        assert_eq!(mono.result.len(), 2);
    }
}
