//! Built-in prompts for chapter alignment.
//!
//! The system prompt frames the oracle as a segmenter, not a translator.
//! The default template is what [`crate::TemplateLibrary`] hands out when
//! no novel-specific template is registered.

use bitext_core::AlignmentTemplate;

/// Identifier of the built-in template, recorded in `template_used`.
pub const DEFAULT_TEMPLATE_ID: &str = "builtin-ru-zh-v1";

/// System prompt sent with every alignment request.
pub const ALIGNMENT_SYSTEM_PROMPT: &str = r#"
You are a bilingual text aligner.

You receive one chapter in Russian and its independent Chinese translation.
Your job is to split both texts into matching segments and pair them in
reading order.

## Alignment Rules
1. Copy text verbatim. Never translate, paraphrase, summarize or correct.
2. Every sentence of BOTH texts must appear in exactly one pair.
3. Keep reading order. Never reorder segments.
4. If one side has no counterpart, emit the pair with the other side as "".
5. Merge several sentences into one pair when the translator merged them.

## Segment Types
- dialogue: quoted speech
- description: scenery, appearance, setting
- action: physical events
- internal: thoughts and feelings

## Confidence
- >= 0.9: clear one-to-one correspondence
- 0.6 - 0.9: loose or merged correspondence
- < 0.6: uncertain pairing

Respond with JSON only.
"#;

/// Default alignment instruction.
pub const DEFAULT_ALIGNMENT_TEMPLATE: &str = r#"Align the two texts below sentence by sentence.

Return exactly one JSON object in this shape:
{"alignments": [{"ru": "Russian segment", "zh": "Chinese segment", "type": "dialogue", "confidence": 0.95}]}

Allowed "type" values: dialogue, description, action, internal.

=== RUSSIAN ===
{source_text}

=== CHINESE ===
{target_text}
"#;

/// Build the built-in template.
pub fn default_template() -> AlignmentTemplate {
    AlignmentTemplate {
        id: DEFAULT_TEMPLATE_ID.to_string(),
        alignment_prompt_template: DEFAULT_ALIGNMENT_TEMPLATE.to_string(),
        system_prompt: Some(ALIGNMENT_SYSTEM_PROMPT.trim().to_string()),
        temperature: 0.1,
        max_tokens: 8192,
    }
}

/// Note appended to the next prompt under `RetryPromptPolicy::ReportShortfall`.
pub fn shortfall_note(source_ratio: f64, target_ratio: f64, threshold: f64) -> String {
    format!(
        "\n\nYour previous answer covered {:.1}% of the Russian text and {:.1}% of the \
         Chinese text; at least {:.1}% of each is required. Include every sentence.",
        source_ratio * 100.0,
        target_ratio * 100.0,
        threshold * 100.0
    )
}
