//! Markup normalization and greedy word wrapping.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::metrics::{text_width, FontFace};
use crate::merge::token;

static LINE_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(?:li|div)\s*>").expect("line break pattern is valid")
});

static PARAGRAPH_BREAK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)</(?:p|h[1-6]|blockquote)\s*>").expect("paragraph pattern is valid")
});

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^<>]*>").expect("tag pattern is valid"));

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(nbsp|quot|#39|apos);").expect("entity pattern is valid")
});

static ESCAPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"&(lt|gt|amp);").expect("escape pattern is valid"));

static INLINE_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").expect("space pattern is valid"));

static BLANK_LINES_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("blank line pattern is valid"));

static PARAGRAPH_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{2,}").expect("split pattern is valid"));

/// Convert waiver markup into plain text with `\n` line breaks and `\n\n`
/// paragraph breaks.
///
/// Placeholder tokens that survived resolution are kept so they stay visible.
/// `&lt;`, `&gt;` and `&amp;` stay encoded so that normalizing the output
/// again changes nothing; [`decode_text`] turns them into characters for
/// display.
pub fn normalize_content(content: &str) -> String {
    let text = content.replace("\r\n", "\n").replace('\r', "\n");
    let text = LINE_BREAK_RE.replace_all(&text, "\n");
    let text = PARAGRAPH_BREAK_RE.replace_all(&text, "\n\n");
    let text = TAG_RE.replace_all(&text, |caps: &Captures| {
        let tag = &caps[0];
        if token::is_placeholder_token(tag) {
            tag.to_string()
        } else {
            String::new()
        }
    });
    let text = ENTITY_RE.replace_all(&text, |caps: &Captures| {
        match &caps[1] {
            "nbsp" => " ",
            "quot" => "\"",
            _ => "'",
        }
        .to_string()
    });

    let lines: Vec<String> = text
        .split('\n')
        .map(|line| INLINE_SPACE_RE.replace_all(line, " ").trim().to_string())
        .collect();
    let joined = lines.join("\n");
    BLANK_LINES_RE
        .replace_all(&joined, "\n\n")
        .trim()
        .to_string()
}

/// Decode the escapes `normalize_content` leaves in place, in one pass.
pub fn decode_text(text: &str) -> String {
    ESCAPE_RE
        .replace_all(text, |caps: &Captures| {
            match &caps[1] {
                "lt" => "<",
                "gt" => ">",
                _ => "&",
            }
            .to_string()
        })
        .into_owned()
}

/// Split normalized text on runs of two or more newlines.
pub fn paragraphs(normalized: &str) -> Vec<&str> {
    PARAGRAPH_SPLIT_RE
        .split(normalized)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

/// Greedy word wrap: words join the current line while it still fits.
///
/// Single newlines inside `text` force a break. A word wider than the line
/// is split between characters.
pub fn wrap_text(text: &str, face: FontFace, size_pt: f32, max_width: f32) -> Vec<String> {
    let mut lines = Vec::new();
    for hard_line in text.split('\n') {
        let mut current = String::new();
        for word in hard_line.split_whitespace() {
            let candidate = if current.is_empty() {
                word.to_string()
            } else {
                format!("{} {}", current, word)
            };
            if text_width(&candidate, face, size_pt) <= max_width {
                current = candidate;
                continue;
            }
            if !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if text_width(word, face, size_pt) <= max_width {
                current = word.to_string();
            } else {
                let mut pieces = split_long_word(word, face, size_pt, max_width);
                current = pieces.pop().unwrap_or_default();
                lines.extend(pieces);
            }
        }
        lines.push(current);
    }
    lines
}

fn split_long_word(word: &str, face: FontFace, size_pt: f32, max_width: f32) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    for c in word.chars() {
        current.push(c);
        if text_width(&current, face, size_pt) > max_width && current.chars().count() > 1 {
            current.pop();
            pieces.push(std::mem::take(&mut current));
            current.push(c);
        }
    }
    pieces.push(current);
    pieces
}
