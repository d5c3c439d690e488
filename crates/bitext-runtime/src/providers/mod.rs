//! LLM provider abstractions for bitext-runtime.
//!
//! The controller talks to the oracle only through [`LlmProvider`].
//! An OpenAI-compatible HTTP provider ships behind the `openai` feature;
//! anything else (local models, test doubles) implements the trait.
//!
//! ## Security
//!
//! Providers use the [`secrets`] module for credential handling.
//! See [`ApiCredential`] for the recommended patterns.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

mod factory;
pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use factory::{ProviderFactory, ProviderRegistry};
pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiCompatibleFactory, OpenAiCompatibleProvider};

/// Errors from LLM providers.
///
/// Every variant is an ordinary attempt failure for the controller.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Empty completion")]
    EmptyCompletion,

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Configuration for a completion request.
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// Request timeout
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "deepseek-chat".to_string(),
            max_tokens: 8192,
            temperature: 0.1,
            timeout: Duration::from_secs(180),
        }
    }
}

/// A chat message for LLM completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    /// Message content
    pub content: String,
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Response from an LLM completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    /// Token usage
    pub usage: TokenUsage,

    /// Model used
    pub model: String,

    /// Stop reason
    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Tokens in the prompt
    pub prompt_tokens: u32,

    /// Tokens in the completion
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used, saturating at `u32::MAX`.
    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }
}

/// Provider abstraction allows swapping LLM backends.
///
/// `Ok` is a successful generation; any `Err` is the failure case and is
/// retried by the controller like a malformed response.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Generate from a system prompt and a user prompt.
    async fn generate(
        &self,
        system_prompt: Option<&str>,
        user_prompt: &str,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt.filter(|s| !s.trim().is_empty()) {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(user_prompt));
        self.complete(messages, config).await
    }

    /// Get provider name for logs.
    fn name(&self) -> &str;

    /// Estimate tokens for a prompt.
    fn estimate_tokens(&self, text: &str) -> u32 {
        // CJK runs close to one token per character; Latin ~4 chars per token
        let chars = text.chars().count();
        let wide = text.chars().filter(|c| (*c as u32) >= 0x2E80).count();
        u32::try_from(wide + (chars - wide) / 4).unwrap_or(u32::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct RecordingProvider {
        seen: Mutex<Vec<ChatMessage>>,
    }

    #[async_trait]
    impl LlmProvider for RecordingProvider {
        async fn complete(
            &self,
            messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            *self.seen.lock() = messages;
            Ok(CompletionResponse {
                content: "ok".to_string(),
                usage: TokenUsage::default(),
                model: config.model.clone(),
                stop_reason: Some("stop".to_string()),
            })
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[test]
    fn test_chat_message_creation() {
        let system = ChatMessage::system("You align texts.");
        assert_eq!(system.role, "system");

        let user = ChatMessage::user("Hello!");
        assert_eq!(user.role, "user");
    }

    #[test]
    fn test_token_usage_total() {
        let usage = TokenUsage {
            prompt_tokens: 100,
            completion_tokens: 50,
        };
        assert_eq!(usage.total(), 150);
    }

    #[tokio::test]
    async fn test_generate_builds_messages() {
        let provider = RecordingProvider {
            seen: Mutex::new(Vec::new()),
        };
        let config = CompletionConfig::default();

        provider.generate(Some("sys"), "user", &config).await.unwrap();
        assert_eq!(
            *provider.seen.lock(),
            vec![ChatMessage::system("sys"), ChatMessage::user("user")]
        );

        provider.generate(Some("  "), "only user", &config).await.unwrap();
        assert_eq!(*provider.seen.lock(), vec![ChatMessage::user("only user")]);
    }

    #[test]
    fn test_token_estimate_counts_cjk_densely() {
        let provider = RecordingProvider {
            seen: Mutex::new(Vec::new()),
        };
        assert_eq!(provider.estimate_tokens("你好世界"), 4);
        assert_eq!(provider.estimate_tokens("abcdefgh"), 2);
    }
}
