//! Shared text patterns.
//!
//! Regexes used by both the response parser and the prompt builder, plus
//! the character classes the sentence segmenter relies on.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    /// Markdown code fence, optionally tagged (```json ... ```)
    pub static ref FENCE_PATTERN: Regex = Regex::new(
        r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)```"
    ).unwrap();

    /// Anything shaped like a named format placeholder: `{name}`
    pub static ref PLACEHOLDER_TOKEN: Regex = Regex::new(
        r"\{([A-Za-z_][A-Za-z0-9_]*)\}"
    ).unwrap();
}

/// Full-width terminators that always end a sentence.
pub const CJK_TERMINATORS: &[char] = &['。', '！', '？', '；'];

/// Latin/Cyrillic terminators, subject to the lowercase-continuation check.
pub const LATIN_TERMINATORS: &[char] = &['.', '!', '?', '…'];

/// Closing punctuation that belongs to the sentence it follows.
pub const TRAILING_CLOSERS: &[char] = &[
    '"', '\'', '”', '’', '»', '」', '』', '）', ')', ']', '】', '》',
];

/// Characters removed before volume-integrity measurement.
pub const LINE_BREAKS: &[char] = &['\n', '\r', '\u{2028}', '\u{2029}'];

pub fn is_cjk_terminator(c: char) -> bool {
    CJK_TERMINATORS.contains(&c)
}

pub fn is_latin_terminator(c: char) -> bool {
    LATIN_TERMINATORS.contains(&c)
}

pub fn is_trailing_closer(c: char) -> bool {
    TRAILING_CLOSERS.contains(&c)
}

pub fn is_line_break(c: char) -> bool {
    LINE_BREAKS.contains(&c)
}

/// Strip the first markdown fence, returning its body, or `None` if unfenced.
pub fn fenced_body(text: &str) -> Option<&str> {
    FENCE_PATTERN
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_body_with_tag() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nThanks";
        assert_eq!(fenced_body(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_fenced_body_without_tag() {
        assert_eq!(fenced_body("```\n[1]\n```"), Some("[1]"));
        assert_eq!(fenced_body("no fences here"), None);
    }

    #[test]
    fn test_placeholder_token() {
        let caps = PLACEHOLDER_TOKEN.captures("Title: {chapter_title}").unwrap();
        assert_eq!(&caps[1], "chapter_title");
        assert!(!PLACEHOLDER_TOKEN.is_match(r#"{"ru": "x"}"#));
    }

    #[test]
    fn test_character_classes() {
        assert!(is_cjk_terminator('。'));
        assert!(!is_cjk_terminator('.'));
        assert!(is_latin_terminator('…'));
        assert!(is_trailing_closer('」'));
        assert!(is_line_break('\u{2028}'));
    }
}
