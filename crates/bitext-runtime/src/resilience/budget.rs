//! Token budget management for oracle calls.
//!
//! A budget covers one alignment request. Once it cannot afford another
//! attempt the controller goes straight to the fallback aligner.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::providers::TokenUsage;

/// Token budget for a single alignment.
#[derive(Debug)]
pub struct TokenBudget {
    /// Maximum tokens allowed
    pub max_tokens: u32,

    /// Currently used tokens
    used: AtomicU32,
}

impl TokenBudget {
    pub fn new(max_tokens: u32) -> Self {
        Self {
            max_tokens,
            used: AtomicU32::new(0),
        }
    }

    /// A budget that never refuses.
    pub fn unlimited() -> Self {
        Self::new(u32::MAX)
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_tokens == u32::MAX
    }

    /// Check if we can afford to use tokens.
    pub fn can_afford(&self, tokens: u32) -> bool {
        self.is_unlimited() || self.remaining() >= tokens
    }

    /// Charge tokens; the counter saturates at `u32::MAX`.
    pub fn record(&self, tokens: u32) {
        let _ = self
            .used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                Some(used.saturating_add(tokens))
            });
    }

    pub fn remaining(&self) -> u32 {
        self.max_tokens.saturating_sub(self.used.load(Ordering::SeqCst))
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }
}

/// Accumulated oracle usage for one alignment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LlmUsage {
    /// Total tokens used
    pub total_tokens: u32,

    /// Prompt/input tokens
    pub prompt_tokens: u32,

    /// Completion/output tokens
    pub completion_tokens: u32,

    /// Number of calls that returned a completion
    pub llm_calls: u32,

    /// Number of calls that errored or timed out
    pub failed_calls: u32,
}

impl LlmUsage {
    /// Add token usage from a provider response.
    pub fn add(&mut self, usage: &TokenUsage) {
        self.prompt_tokens = self.prompt_tokens.saturating_add(usage.prompt_tokens);
        self.completion_tokens = self
            .completion_tokens
            .saturating_add(usage.completion_tokens);
        self.total_tokens = self.total_tokens.saturating_add(usage.total());
        self.llm_calls = self.llm_calls.saturating_add(1);
    }

    pub fn record_failure(&mut self) {
        self.failed_calls = self.failed_calls.saturating_add(1);
    }

    pub fn calls(&self) -> u32 {
        self.llm_calls.saturating_add(self.failed_calls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_enforcement() {
        let budget = TokenBudget::new(100);

        assert!(budget.can_afford(50));
        assert!(budget.can_afford(100));
        assert!(!budget.can_afford(101));

        budget.record(60);
        assert_eq!(budget.remaining(), 40);
        assert_eq!(budget.used(), 60);
        assert!(!budget.can_afford(50));
        assert!(budget.can_afford(40));
    }

    #[test]
    fn test_budget_saturates() {
        let budget = TokenBudget::new(10);
        budget.record(25);
        assert_eq!(budget.remaining(), 0);
        assert!(TokenBudget::unlimited().can_afford(1_000_000));
    }

    #[test]
    fn test_record_never_wraps() {
        let budget = TokenBudget::new(1_000);
        budget.record(u32::MAX);
        budget.record(10);
        assert_eq!(budget.used(), u32::MAX);
        assert_eq!(budget.remaining(), 0);

        let unlimited = TokenBudget::unlimited();
        unlimited.record(u32::MAX);
        assert!(unlimited.can_afford(500));
    }

    #[test]
    fn test_usage_saturates_on_huge_reports() {
        let mut usage = LlmUsage::default();
        let huge = TokenUsage {
            prompt_tokens: u32::MAX,
            completion_tokens: 1,
        };
        usage.add(&huge);
        usage.add(&huge);

        assert_eq!(huge.total(), u32::MAX);
        assert_eq!(usage.prompt_tokens, u32::MAX);
        assert_eq!(usage.total_tokens, u32::MAX);
        assert_eq!(usage.completion_tokens, 2);
    }

    #[test]
    fn test_usage_accumulates() {
        let mut usage = LlmUsage::default();
        usage.add(&TokenUsage {
            prompt_tokens: 1000,
            completion_tokens: 500,
        });
        usage.add(&TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
        });
        usage.record_failure();

        assert_eq!(usage.total_tokens, 1515);
        assert_eq!(usage.llm_calls, 2);
        assert_eq!(usage.calls(), 3);
    }
}
