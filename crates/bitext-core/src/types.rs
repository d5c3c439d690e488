//! Core types for bilingual alignment.

use serde::{Deserialize, Serialize};

use crate::quality::QualityMetrics;

/// Confidence assigned when the oracle omits one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Narrative role of an aligned segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    Dialogue,
    Description,
    Action,
    Internal,
    #[default]
    Unknown,
}

impl SegmentType {
    /// Map a free-form oracle tag onto a segment type.
    ///
    /// Anything unrecognized becomes `Unknown`.
    pub fn from_tag(tag: &str) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "dialogue" | "dialog" | "speech" => Self::Dialogue,
            "description" | "narration" | "narrative" => Self::Description,
            "action" => Self::Action,
            "internal" | "thought" | "monologue" | "internal_monologue" => Self::Internal,
            _ => Self::Unknown,
        }
    }

    /// Guess the type of a segment from its leading punctuation.
    ///
    /// Only dialogue can be recognized without semantics.
    pub fn guess(text: &str) -> Self {
        match text.trim_start().chars().next() {
            Some('"' | '“' | '«' | '„' | '「' | '『' | '—' | '–') => Self::Dialogue,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dialogue => "dialogue",
            Self::Description => "description",
            Self::Action => "action",
            Self::Internal => "internal",
            Self::Unknown => "unknown",
        }
    }
}

/// One matched unit of source and target text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentPair {
    /// Segment of the source-language text (may be empty for unmatched target text)
    pub source: String,

    /// Segment of the target-language text (may be empty for unmatched source text)
    pub target: String,

    /// Narrative role of the segment
    #[serde(default)]
    pub segment_type: SegmentType,

    /// Confidence in the correspondence (0.0 - 1.0)
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

fn default_confidence() -> f64 {
    DEFAULT_CONFIDENCE
}

impl AlignmentPair {
    /// Create a pair, clamping confidence into `[0, 1]`.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        segment_type: SegmentType,
        confidence: f64,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            segment_type,
            confidence: clamp_confidence(confidence),
        }
    }

    /// Whether one side of the pair has no text.
    pub fn is_unmatched(&self) -> bool {
        self.source.trim().is_empty() || self.target.trim().is_empty()
    }
}

/// Clamp a confidence value into `[0, 1]`; NaN becomes the default.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        DEFAULT_CONFIDENCE
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Ordered sequence of alignment pairs for one chapter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlignmentResult {
    pub pairs: Vec<AlignmentPair>,
}

impl AlignmentResult {
    pub fn new(pairs: Vec<AlignmentPair>) -> Self {
        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AlignmentPair> {
        self.pairs.iter()
    }

    /// Concatenation of every source segment, in order.
    pub fn joined_source(&self) -> String {
        self.pairs.iter().map(|p| p.source.as_str()).collect()
    }

    /// Concatenation of every target segment, in order.
    pub fn joined_target(&self) -> String {
        self.pairs.iter().map(|p| p.target.as_str()).collect()
    }
}

impl From<Vec<AlignmentPair>> for AlignmentResult {
    fn from(pairs: Vec<AlignmentPair>) -> Self {
        Self { pairs }
    }
}

impl<'a> IntoIterator for &'a AlignmentResult {
    type Item = &'a AlignmentPair;
    type IntoIter = std::slice::Iter<'a, AlignmentPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.iter()
    }
}

/// How an alignment was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentMethod {
    /// Oracle alignment that passed validation
    Llm,

    /// Deterministic punctuation-based pairing
    RegexFallback,

    /// Source text was empty; target paragraphs only
    Monolingual,
}

impl AlignmentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::RegexFallback => "regex_fallback",
            Self::Monolingual => "monolingual",
        }
    }

    /// Parse the stored representation.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "llm" => Some(Self::Llm),
            "regex_fallback" => Some(Self::RegexFallback),
            "monolingual" => Some(Self::Monolingual),
            _ => None,
        }
    }
}

impl std::fmt::Display for AlignmentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the payload handed to renderers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedPair {
    pub source: String,
    pub target: String,
    #[serde(rename = "type")]
    pub segment_type: SegmentType,
    pub confidence: f64,
}

/// Statistics attached to a render payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderStats {
    #[serde(flatten)]
    pub metrics: QualityMetrics,
    pub method: AlignmentMethod,
}

/// What the rendering layer consumes: `{alignments: [...], stats}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderPayload {
    pub alignments: Vec<RenderedPair>,
    pub stats: RenderStats,
}

impl RenderPayload {
    pub fn new(result: &AlignmentResult, metrics: &QualityMetrics, method: AlignmentMethod) -> Self {
        Self {
            alignments: result
                .iter()
                .map(|p| RenderedPair {
                    source: p.source.clone(),
                    target: p.target.clone(),
                    segment_type: p.segment_type,
                    confidence: p.confidence,
                })
                .collect(),
            stats: RenderStats {
                metrics: metrics.clone(),
                method,
            },
        }
    }
}
