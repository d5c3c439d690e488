//! Engine configuration.
//!
//! Loaded from YAML; durations are written the human way (`"90s"`, `"1h"`).
//!
//! ```yaml
//! model:
//!   name: deepseek-chat
//!   base_url: https://api.deepseek.com/v1
//! request_timeout: 3m
//! relaxation: [0.98, 0.96, 0.95]
//! retry:
//!   prompt_policy: report_shortfall
//!   backoff: { min_delay: 2s, max_delay: 30s }
//! budget:
//!   max_tokens_per_alignment: 120000
//! cache:
//!   capacity: 500
//!   ttl: 1h
//! ```

use bitext_core::{AlignmentTemplate, QualityGate};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::providers::CompletionConfig;
use crate::resilience::RetryBackoff;

/// Errors from loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde adapter for `humantime` durations.
pub(crate) mod duration_str {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        humantime::parse_duration(text.trim()).map_err(serde::de::Error::custom)
    }
}

/// Oracle selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Provider type registered in the `ProviderRegistry`
    pub provider: String,

    /// Model name sent with each request
    pub name: String,

    /// Endpoint override
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            name: "deepseek-chat".to_string(),
            base_url: None,
        }
    }
}

impl ModelConfig {
    /// Provider factory input; the API key comes from the environment.
    pub fn provider_config(&self) -> serde_json::Value {
        match &self.base_url {
            Some(url) => serde_json::json!({ "base_url": url }),
            None => serde_json::json!({}),
        }
    }
}

/// Volume integrity thresholds, one per attempt, strictly decreasing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct RelaxationSchedule(Vec<f64>);

impl RelaxationSchedule {
    pub fn new(thresholds: Vec<f64>) -> Result<Self, ConfigError> {
        if thresholds.is_empty() {
            return Err(ConfigError::Invalid(
                "relaxation schedule needs at least one threshold".to_string(),
            ));
        }
        if let Some(bad) = thresholds.iter().find(|t| !(**t > 0.0 && **t <= 1.0)) {
            return Err(ConfigError::Invalid(format!(
                "relaxation threshold {} outside (0, 1]",
                bad
            )));
        }
        if thresholds.windows(2).any(|w| w[1] >= w[0]) {
            return Err(ConfigError::Invalid(format!(
                "relaxation thresholds must strictly decrease: {:?}",
                thresholds
            )));
        }
        Ok(Self(thresholds))
    }

    /// Threshold for attempt `n`, counting from 1.
    pub fn threshold(&self, attempt: u32) -> Option<f64> {
        let index = usize::try_from(attempt).ok()?.checked_sub(1)?;
        self.0.get(index).copied()
    }

    pub fn attempts(&self) -> u32 {
        self.0.len() as u32
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.0
    }
}

impl Default for RelaxationSchedule {
    fn default() -> Self {
        Self(vec![0.98, 0.96, 0.95])
    }
}

impl TryFrom<Vec<f64>> for RelaxationSchedule {
    type Error = ConfigError;

    fn try_from(thresholds: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(thresholds)
    }
}

impl From<RelaxationSchedule> for Vec<f64> {
    fn from(schedule: RelaxationSchedule) -> Self {
        schedule.0
    }
}

/// What the prompt of a retry looks like.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryPromptPolicy {
    /// Resend the same prompt
    #[default]
    Identical,

    /// Append the measured coverage shortfall of the previous attempt
    ReportShortfall,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub backoff: RetryBackoff,
    pub prompt_policy: RetryPromptPolicy,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Token ceiling for one alignment, unlimited when absent
    pub max_tokens_per_alignment: Option<u32>,
}

/// Read-through cache in front of the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: u64,

    #[serde(with = "duration_str")]
    pub ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 1_000,
            ttl: Duration::from_secs(3600),
        }
    }
}

/// Everything the controller and service need besides their collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub model: ModelConfig,

    /// Timeout around each oracle call
    #[serde(with = "duration_str")]
    pub request_timeout: Duration,

    pub relaxation: RelaxationSchedule,

    pub gate: QualityGate,

    pub retry: RetryConfig,

    pub budget: BudgetConfig,

    pub cache: CacheConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            request_timeout: Duration::from_secs(180),
            relaxation: RelaxationSchedule::default(),
            gate: QualityGate::default(),
            retry: RetryConfig::default(),
            budget: BudgetConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml(&fs::read_to_string(path)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.model.name.trim().is_empty() {
            return Err(ConfigError::Invalid("model.name is empty".to_string()));
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "request_timeout must be positive".to_string(),
            ));
        }
        if self.cache.capacity == 0 {
            return Err(ConfigError::Invalid(
                "cache.capacity must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_backoff(mut self, backoff: RetryBackoff) -> Self {
        self.retry.backoff = backoff;
        self
    }

    pub fn with_prompt_policy(mut self, policy: RetryPromptPolicy) -> Self {
        self.retry.prompt_policy = policy;
        self
    }

    pub fn with_token_budget(mut self, max_tokens: Option<u32>) -> Self {
        self.budget.max_tokens_per_alignment = max_tokens;
        self
    }

    /// Request settings for one attempt with the given template.
    pub fn completion_config(&self, template: &AlignmentTemplate) -> CompletionConfig {
        CompletionConfig {
            model: self.model.name.clone(),
            max_tokens: template.max_tokens,
            temperature: template.temperature,
            timeout: self.request_timeout,
        }
    }
}
