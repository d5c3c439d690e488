//! Why an alignment ended on the deterministic aligner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason the controller reached the fallback state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FallbackReason {
    /// No template resolved for the chapter
    NoTemplate,

    /// Template resolved but did not render
    TemplateUnrenderable { message: String },

    /// Every attempt of the schedule failed
    AttemptsExhausted { attempts: u32 },

    /// The token budget could not afford the next attempt
    BudgetExhausted { attempts: u32, remaining: u32 },

    /// Caller asked for the oracle-free path
    Offline,
}

impl FallbackReason {
    /// Whether the reason is a configuration problem rather than oracle failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FallbackReason::NoTemplate | FallbackReason::TemplateUnrenderable { .. }
        )
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::NoTemplate => write!(f, "no alignment template configured"),
            FallbackReason::TemplateUnrenderable { message } => {
                write!(f, "template does not render: {}", message)
            }
            FallbackReason::AttemptsExhausted { attempts } => {
                write!(f, "all {} attempts failed", attempts)
            }
            FallbackReason::BudgetExhausted {
                attempts,
                remaining,
            } => write!(
                f,
                "token budget exhausted after {} attempts ({} tokens left)",
                attempts, remaining
            ),
            FallbackReason::Offline => write!(f, "offline alignment requested"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_reasons() {
        assert!(FallbackReason::NoTemplate.is_configuration());
        assert!(FallbackReason::TemplateUnrenderable {
            message: "x".to_string()
        }
        .is_configuration());
        assert!(!FallbackReason::AttemptsExhausted { attempts: 3 }.is_configuration());
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(FallbackReason::AttemptsExhausted { attempts: 3 }).unwrap();
        assert_eq!(json["type"], "attempts_exhausted");
        assert_eq!(json["attempts"], 3);
    }
}
