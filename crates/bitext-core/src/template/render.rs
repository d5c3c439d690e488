//! Prompt rendering with safe brace handling.
//!
//! Templates routinely embed JSON examples, so every brace is literal
//! except the two placeholder markers. Substituted chapter text is never
//! rescanned, which keeps braces inside the chapter from being read as
//! placeholders.

use thiserror::Error;

use crate::patterns::PLACEHOLDER_TOKEN;

/// Marker replaced by the source-language text.
pub const SOURCE_PLACEHOLDER: &str = "{source_text}";

/// Marker replaced by the target-language text.
pub const TARGET_PLACEHOLDER: &str = "{target_text}";

/// Errors from rendering a template.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("template is missing placeholder {0}")]
    MissingPlaceholder(&'static str),

    #[error("template has unresolved placeholder {{{0}}}")]
    UnresolvedPlaceholder(String),

    #[error("template braces are unbalanced: {open} opening vs {close} closing")]
    Unbalanced { open: usize, close: usize },
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Piece<'a> {
    Literal(&'a str),
    Source,
    Target,
}

/// Render a template with the two chapter texts.
pub fn render_prompt(template: &str, source: &str, target: &str) -> Result<String, TemplateError> {
    let pieces = tokenize(template);

    if !pieces.contains(&Piece::Source) {
        return Err(TemplateError::MissingPlaceholder(SOURCE_PLACEHOLDER));
    }
    if !pieces.contains(&Piece::Target) {
        return Err(TemplateError::MissingPlaceholder(TARGET_PLACEHOLDER));
    }

    let (mut open, mut close) = (0, 0);
    for piece in &pieces {
        if let Piece::Literal(text) = piece {
            if let Some(caps) = PLACEHOLDER_TOKEN.captures(text) {
                return Err(TemplateError::UnresolvedPlaceholder(caps[1].to_string()));
            }
            open += text.matches('{').count();
            close += text.matches('}').count();
        }
    }
    if open != close {
        return Err(TemplateError::Unbalanced { open, close });
    }

    let mut prompt = String::with_capacity(template.len() + source.len() + target.len());
    for piece in pieces {
        match piece {
            Piece::Literal(text) => prompt.push_str(text),
            Piece::Source => prompt.push_str(source),
            Piece::Target => prompt.push_str(target),
        }
    }

    Ok(prompt)
}

fn tokenize(template: &str) -> Vec<Piece<'_>> {
    let mut pieces = Vec::new();
    let mut rest = template;

    loop {
        let next = [
            (SOURCE_PLACEHOLDER, Piece::Source),
            (TARGET_PLACEHOLDER, Piece::Target),
        ]
        .into_iter()
        .filter_map(|(marker, piece)| rest.find(marker).map(|at| (at, marker.len(), piece)))
        .min_by_key(|(at, _, _)| *at);

        match next {
            Some((at, len, piece)) => {
                if at > 0 {
                    pieces.push(Piece::Literal(&rest[..at]));
                }
                pieces.push(piece);
                rest = &rest[at + len..];
            }
            None => {
                if !rest.is_empty() {
                    pieces.push(Piece::Literal(rest));
                }
                break;
            }
        }
    }

    pieces
}
