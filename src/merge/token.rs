//! The one definition of a placeholder token.
//!
//! Merge-field key validation, the resolver, authoring preview and the
//! renderer's markup stripper all go through this module so they agree on
//! what `<key>` means.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// Maximum length of a merge-field key.
pub const MAX_KEY_LEN: usize = 50;

/// Tag names that also read as waiver markup. A `<name>` token with one of
/// these names is a placeholder only when a value is supplied for it;
/// otherwise it is left alone as markup.
pub const MARKUP_TAG_NAMES: &[&str] = &[
    "a", "b", "blockquote", "br", "center", "code", "div", "em", "h1", "h2", "h3", "h4", "h5",
    "h6", "hr", "i", "li", "ol", "p", "pre", "s", "small", "span", "strike", "strong", "sub",
    "sup", "table", "tbody", "td", "th", "thead", "tr", "u", "ul",
];

static KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_]*$").expect("key pattern is valid"));

static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<([a-z][a-z0-9_]*)>").expect("token pattern is valid"));

/// Why a candidate merge-field key was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyError {
    Empty,
    TooLong,
    Pattern,
}

impl KeyError {
    pub fn message(&self) -> String {
        match self {
            KeyError::Empty => "Key is required".to_string(),
            KeyError::TooLong => format!("Key must be at most {} characters", MAX_KEY_LEN),
            KeyError::Pattern => {
                "Key must start with a lowercase letter and contain only lowercase letters, digits and underscores".to_string()
            }
        }
    }
}

/// Check a merge-field key against the key rules.
pub fn check_key(key: &str) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(KeyError::TooLong);
    }
    if !KEY_RE.is_match(key) {
        return Err(KeyError::Pattern);
    }
    Ok(())
}

pub fn is_valid_key(key: &str) -> bool {
    check_key(key).is_ok()
}

/// True if `key` is also a markup tag name.
pub fn is_markup_name(key: &str) -> bool {
    MARKUP_TAG_NAMES.contains(&key)
}

/// Keys of every placeholder token in `content`, in order of appearance,
/// repeats included. Markup-named tokens are not listed.
pub fn placeholder_keys(content: &str) -> impl Iterator<Item = &str> {
    TOKEN_RE
        .captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .filter(|key| is_valid_key(key) && !is_markup_name(key))
}

/// Replace every placeholder token in a single left-to-right pass.
///
/// `replace` receives every well-formed key, markup names included, and
/// returns the replacement or `None` to keep the token verbatim. Replacement
/// text is never rescanned.
pub fn replace_placeholders<F>(content: &str, mut replace: F) -> String
where
    F: FnMut(&str) -> Option<String>,
{
    TOKEN_RE
        .replace_all(content, |caps: &Captures| {
            let whole = &caps[0];
            let key = &caps[1];
            if !is_valid_key(key) {
                return whole.to_string();
            }
            replace(key).unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

/// True if `tag` is exactly one placeholder token. Markup-named tokens left
/// in content after resolution are markup, not placeholders.
pub fn is_placeholder_token(tag: &str) -> bool {
    TOKEN_RE
        .captures(tag)
        .filter(|caps| caps.get(0).map(|m| m.as_str().len()) == Some(tag.len()))
        .and_then(|caps| caps.get(1))
        .map(|m| is_valid_key(m.as_str()) && !is_markup_name(m.as_str()))
        .unwrap_or(false)
}
