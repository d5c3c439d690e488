//! Sentence and paragraph segmentation.
//!
//! Splits prose into sentences using language-appropriate terminators:
//! - CJK full-width `。！？；` always close a sentence and stay with it
//! - Latin/Cyrillic `.` `!` `?` `…` close a sentence unless the text
//!   continues in lowercase (abbreviations, "etc. and so on") or the
//!   terminator is glued to the next character (`3.14`)
//! - Line breaks always close a sentence
//!
//! Every sentence is a trimmed, non-overlapping slice of the input, so the
//! total length of the output never exceeds the input length.

use crate::patterns::{is_cjk_terminator, is_latin_terminator, is_line_break, is_trailing_closer};

/// Split text into trimmed, non-empty sentences.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if is_line_break(c) {
            flush(&mut current, &mut sentences);
            i += 1;
            continue;
        }

        current.push(c);
        i += 1;

        if is_cjk_terminator(c) {
            while i < chars.len() && (is_cjk_terminator(chars[i]) || is_trailing_closer(chars[i])) {
                current.push(chars[i]);
                i += 1;
            }
            flush(&mut current, &mut sentences);
        } else if is_latin_terminator(c) {
            while i < chars.len()
                && (is_latin_terminator(chars[i]) || is_trailing_closer(chars[i]))
            {
                current.push(chars[i]);
                i += 1;
            }
            if is_latin_boundary(&chars, i) {
                flush(&mut current, &mut sentences);
            }
        }
    }

    flush(&mut current, &mut sentences);
    sentences
}

/// Split text into paragraphs: one per non-blank line.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split(is_line_break)
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Whether a Latin terminator run ending just before `next` is a boundary.
fn is_latin_boundary(chars: &[char], next: usize) -> bool {
    match chars.get(next) {
        None => true,
        Some(&c) if is_line_break(c) => true,
        // Glued to the following character: decimals, initials, URLs
        Some(&c) if !c.is_whitespace() => false,
        Some(_) => match chars[next..].iter().find(|c| !c.is_whitespace()) {
            None => true,
            Some(c) => !c.is_lowercase(),
        },
    }
}

fn flush(current: &mut String, sentences: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cjk_sentences() {
        let sentences = split_sentences("他来了。她走了！为什么？因为下雨；");
        assert_eq!(sentences, vec!["他来了。", "她走了！", "为什么？", "因为下雨；"]);
    }

    #[test]
    fn test_cjk_closing_quote_stays() {
        let sentences = split_sentences("「走吧。」他说。");
        assert_eq!(sentences, vec!["「走吧。」", "他说。"]);
    }

    #[test]
    fn test_latin_sentences() {
        let sentences = split_sentences("Он пришёл. Она ушла! Почему?");
        assert_eq!(sentences, vec!["Он пришёл.", "Она ушла!", "Почему?"]);
    }

    #[test]
    fn test_lowercase_continuation_is_not_boundary() {
        let sentences = split_sentences("Он купил хлеб, молоко и т. д. и пошёл домой. Конец.");
        assert_eq!(sentences, vec!["Он купил хлеб, молоко и т. д. и пошёл домой.", "Конец."]);
    }

    #[test]
    fn test_glued_terminator_is_not_boundary() {
        let sentences = split_sentences("Pi is 3.14 roughly. Yes.");
        assert_eq!(sentences, vec!["Pi is 3.14 roughly.", "Yes."]);
    }

    #[test]
    fn test_ellipsis_and_runs() {
        let sentences = split_sentences("Wait... What?! No…");
        assert_eq!(sentences, vec!["Wait...", "What?!", "No…"]);
    }

    #[test]
    fn test_line_breaks_split() {
        let sentences = split_sentences("First line without stop\nSecond line");
        assert_eq!(sentences, vec!["First line without stop", "Second line"]);
    }

    #[test]
    fn test_empty_and_blank() {
        assert!(split_sentences("").is_empty());
        assert!(split_sentences("  \n \n").is_empty());
    }

    #[test]
    fn test_paragraphs() {
        assert_eq!(split_paragraphs("Para one.\n\nPara two."), vec!["Para one.", "Para two."]);
        assert_eq!(split_paragraphs("a\r\nb\n  \nc"), vec!["a", "b", "c"]);
        assert!(split_paragraphs("\n\n").is_empty());
    }
}
