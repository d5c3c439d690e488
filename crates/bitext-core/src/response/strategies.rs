//! Individual parse strategies, tried in declaration order.

use serde::Deserialize;
use serde_json::{Map as JsonMap, Value as JsonValue};

use super::{validate_response_schema, ParseError, REQUIRED_FIELD};
use crate::patterns::fenced_body;
use crate::types::{AlignmentPair, AlignmentResult, SegmentType, DEFAULT_CONFIDENCE};

/// Upper bound on `{` positions tried by the brace-span strategy.
const MAX_SPAN_CANDIDATES: usize = 32;

/// A pure `(text) -> Result<AlignmentResult, ParseError>` extraction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    /// Strip markdown fences and parse the remainder as JSON
    FencedJson,

    /// Parse the first balanced top-level object naming the required field
    BalancedObject,

    /// Try brace-delimited spans, longest first
    LongestBraceSpan,
}

impl ParseStrategy {
    pub const ALL: [ParseStrategy; 3] = [
        ParseStrategy::FencedJson,
        ParseStrategy::BalancedObject,
        ParseStrategy::LongestBraceSpan,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::FencedJson => "fenced_json",
            Self::BalancedObject => "balanced_object",
            Self::LongestBraceSpan => "longest_brace_span",
        }
    }

    pub fn apply(&self, raw: &str) -> Result<AlignmentResult, ParseError> {
        match self {
            Self::FencedJson => fenced_json(raw),
            Self::BalancedObject => balanced_object(raw),
            Self::LongestBraceSpan => longest_brace_span(raw),
        }
    }
}

fn fenced_json(raw: &str) -> Result<AlignmentResult, ParseError> {
    let body = fenced_body(raw).unwrap_or_else(|| raw.trim());
    decode_text(body)
}

fn balanced_object(raw: &str) -> Result<AlignmentResult, ParseError> {
    let needle = format!("\"{}\"", REQUIRED_FIELD);
    let mut last_error = ParseError::MissingField(REQUIRED_FIELD);

    for block in balanced_objects(raw).into_iter().filter(|b| b.contains(&needle)) {
        match decode_text(block) {
            Ok(result) => return Ok(result),
            Err(e) => last_error = e,
        }
    }

    Err(last_error)
}

fn longest_brace_span(raw: &str) -> Result<AlignmentResult, ParseError> {
    let last_close = raw.rfind('}').ok_or(ParseError::NoJsonObject)?;
    let mut last_error = ParseError::NoJsonObject;

    let starts = raw
        .match_indices('{')
        .map(|(i, _)| i)
        .filter(|&i| i < last_close)
        .take(MAX_SPAN_CANDIDATES);

    for start in starts {
        match decode_text(&raw[start..=last_close]) {
            Ok(result) => return Ok(result),
            Err(e) => last_error = e,
        }

        // The span may end in prose braces; decode one value and ignore the rest.
        let mut stream = serde_json::Deserializer::from_str(&raw[start..]).into_iter::<JsonValue>();
        if let Some(Ok(value)) = stream.next() {
            match decode_value(value) {
                Ok(result) => return Ok(result),
                Err(e) => last_error = e,
            }
        }
    }

    Err(last_error)
}

/// Top-level `{...}` blocks, skipping braces inside JSON strings.
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        blocks.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    blocks
}

fn decode_text(text: &str) -> Result<AlignmentResult, ParseError> {
    let value: JsonValue =
        serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;
    decode_value(value)
}

fn decode_value(value: JsonValue) -> Result<AlignmentResult, ParseError> {
    if value.get(REQUIRED_FIELD).is_none() {
        return Err(ParseError::MissingField(REQUIRED_FIELD));
    }

    validate_response_schema(&value).map_err(ParseError::Schema)?;

    let response: WireResponse =
        serde_json::from_value(value).map_err(|e| ParseError::Json(e.to_string()))?;

    let pairs: Vec<AlignmentPair> = response
        .alignments
        .into_iter()
        .filter_map(wire_pair)
        .collect();

    if pairs.is_empty() {
        return Err(ParseError::EmptyAlignments);
    }

    Ok(AlignmentResult::new(pairs))
}

/// Response envelope as the oracle writes it.
#[derive(Debug, Deserialize)]
struct WireResponse {
    alignments: Vec<JsonMap<String, JsonValue>>,
}

/// Accepted keys per field, highest priority first.
const SOURCE_KEYS: &[&str] = &["ru", "source", "src", "original"];
const TARGET_KEYS: &[&str] = &["zh", "target", "tgt", "translation"];
const TYPE_KEYS: &[&str] = &["type", "segment_type"];

/// First key in `keys` holding a string.
fn first_text<'a>(item: &'a JsonMap<String, JsonValue>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .find_map(|key| item.get(*key).and_then(JsonValue::as_str))
}

/// Convert one wire item to a pair, dropping items with no text on either side.
fn wire_pair(item: JsonMap<String, JsonValue>) -> Option<AlignmentPair> {
    let source = first_text(&item, SOURCE_KEYS).unwrap_or_default();
    let target = first_text(&item, TARGET_KEYS).unwrap_or_default();
    if source.trim().is_empty() && target.trim().is_empty() {
        return None;
    }

    let segment_type = first_text(&item, TYPE_KEYS)
        .map(SegmentType::from_tag)
        .unwrap_or_default();
    let confidence = item
        .get("confidence")
        .and_then(lenient_confidence)
        .unwrap_or(DEFAULT_CONFIDENCE);

    Some(AlignmentPair::new(source, target, segment_type, confidence))
}

/// Accept `0.9` or `"0.9"`; anything unreadable counts as missing.
fn lenient_confidence(value: &JsonValue) -> Option<f64> {
    match value {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
