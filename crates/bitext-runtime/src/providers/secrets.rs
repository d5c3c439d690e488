//! Credential handling for LLM providers.
//!
//! API keys are wrapped in [`ApiCredential`] as soon as they are read, so
//! they cannot show up in `Debug` output, tracing fields or error messages.
//!
//! ```ignore
//! let cred = ApiCredential::from_config_or_env(
//!     &config,
//!     "api_key",
//!     &["BITEXT_API_KEY", "OPENAI_API_KEY"],
//!     "alignment API key",
//! )?;
//! request.bearer_auth(cred.expose());
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde_json::Value as JsonValue;
use std::fmt;

use super::ProviderError;

/// Where a credential was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// Loaded from configuration file/JSON
    Config,
    /// Loaded from environment variable
    Environment,
    /// Provided programmatically
    Programmatic,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Config => write!(f, "config"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Programmatic => write!(f, "programmatic"),
        }
    }
}

/// A securely-stored API credential.
///
/// `Debug` and `Display` print `[REDACTED]`; the value is only reachable
/// through [`ApiCredential::expose`].
pub struct ApiCredential {
    value: SecretString,
    source: CredentialSource,
    name: &'static str,
}

impl ApiCredential {
    /// Wrap a credential value.
    pub fn new(value: impl Into<String>, source: CredentialSource, name: &'static str) -> Self {
        Self {
            value: SecretString::from(value.into()),
            source,
            name,
        }
    }

    /// Load from `config[config_key]`, else from the first set variable in `env_vars`.
    pub fn from_config_or_env(
        config: &JsonValue,
        config_key: &str,
        env_vars: &[&str],
        name: &'static str,
    ) -> Result<Self, ProviderError> {
        if let Some(value) = config[config_key].as_str() {
            return Ok(Self::new(value, CredentialSource::Config, name));
        }

        for var in env_vars {
            if let Ok(value) = std::env::var(var) {
                return Ok(Self::new(value, CredentialSource::Environment, name));
            }
        }

        Err(ProviderError::NotConfigured(format!(
            "{} required: set '{}' in config or one of {:?}",
            name, config_key, env_vars
        )))
    }

    /// Check if a credential is available (without loading it).
    pub fn is_available(config: &JsonValue, config_key: &str, env_vars: &[&str]) -> bool {
        config[config_key].as_str().is_some() || env_vars.iter().any(|v| std::env::var(v).is_ok())
    }

    /// Expose the value at the point of use (e.g. an auth header).
    pub fn expose(&self) -> &str {
        self.value.expose_secret()
    }

    pub fn is_empty(&self) -> bool {
        self.value.expose_secret().is_empty()
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiCredential")
            .field("value", &"[REDACTED]")
            .field("source", &self.source)
            .field("name", &self.name)
            .finish()
    }
}

impl fmt::Display for ApiCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {} [REDACTED]", self.name, self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MISSING_VAR: &str = "BITEXT_TEST_KEY_THAT_IS_NEVER_SET";

    #[test]
    fn test_debug_and_display_redacted() {
        let secret = "sk-very-secret-0001";
        let cred = ApiCredential::new(secret, CredentialSource::Programmatic, "test key");

        let debug = format!("{:?}", cred);
        let display = format!("{}", cred);
        assert!(!debug.contains(secret));
        assert!(!display.contains(secret));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(cred.expose(), secret);
    }

    #[test]
    fn test_config_takes_precedence() {
        let config = serde_json::json!({"api_key": "from-config"});
        let cred =
            ApiCredential::from_config_or_env(&config, "api_key", &[MISSING_VAR], "key").unwrap();
        assert_eq!(cred.expose(), "from-config");
        assert_eq!(cred.source(), CredentialSource::Config);
    }

    #[test]
    fn test_missing_everywhere() {
        let config = serde_json::json!({});
        let result = ApiCredential::from_config_or_env(&config, "api_key", &[MISSING_VAR], "key");
        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
        assert!(!ApiCredential::is_available(&config, "api_key", &[MISSING_VAR]));
    }

    #[test]
    fn test_empty_credential() {
        let cred = ApiCredential::new("", CredentialSource::Config, "key");
        assert!(cred.is_empty());
        assert_eq!(cred.name(), "key");
    }
}
