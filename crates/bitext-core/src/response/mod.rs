//! Extraction of structured alignments from raw oracle output.
//!
//! Oracle output is rarely clean JSON: it comes wrapped in markdown fences,
//! preceded by a greeting or followed by an explanation. Parsing is modeled
//! as an ordered list of pure strategies; the first one that yields a
//! non-empty alignment wins.

mod schema;
mod strategies;

pub use schema::{validate_response_schema, SchemaError};
pub use strategies::ParseStrategy;

use thiserror::Error;

use crate::types::AlignmentResult;

/// Field every accepted response object must carry.
pub const REQUIRED_FIELD: &str = "alignments";

/// Errors from response parsing.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("no JSON object found")]
    NoJsonObject,

    #[error("JSON decode failed: {0}")]
    Json(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("response violates schema: {}", .0.join("; "))]
    Schema(Vec<String>),

    #[error("alignment list contains no usable pairs")]
    EmptyAlignments,

    #[error("no strategy could extract an alignment from {} chars of output", .raw.chars().count())]
    Unparseable {
        /// Original oracle output, kept for diagnostics
        raw: String,

        /// One entry per strategy: `"<strategy>: <error>"`
        failures: Vec<String>,
    },
}

/// Parse raw oracle output into an alignment.
///
/// Tries every [`ParseStrategy`] in order and returns the first success.
pub fn parse_response(raw: &str) -> Result<AlignmentResult, ParseError> {
    let mut failures = Vec::with_capacity(ParseStrategy::ALL.len());

    for strategy in ParseStrategy::ALL {
        match strategy.apply(raw) {
            Ok(result) => {
                tracing::debug!(
                    strategy = strategy.name(),
                    pairs = result.len(),
                    "Parsed oracle response"
                );
                return Ok(result);
            }
            Err(e) => {
                tracing::trace!(strategy = strategy.name(), error = %e, "Parse strategy rejected");
                failures.push(format!("{}: {}", strategy.name(), e));
            }
        }
    }

    Err(ParseError::Unparseable {
        raw: raw.to_string(),
        failures,
    })
}
