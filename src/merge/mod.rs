//! Merge-field resolution.
//!
//! Turns authored template content into the text a signer reads by
//! substituting `<key>` placeholders from per-signing overrides, then
//! organization defaults.

pub mod token;

use std::collections::HashMap;

use serde::Serialize;

use crate::errors::AppError;

/// Outcome of one resolution pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub resolved_content: String,
    /// Keys with neither an override nor a default, in order of first appearance.
    pub unresolved_keys: Vec<String>,
}

/// What happens to a placeholder nobody supplied a value for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedPolicy {
    /// Keep the `<key>` token in the output.
    #[default]
    LeaveVerbatim,
    /// Replace the token with empty text.
    Blank,
    /// Keep the token, and refuse to sign content that still has one.
    Reject,
}

impl UnresolvedPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "verbatim" | "leave_verbatim" => Some(UnresolvedPolicy::LeaveVerbatim),
            "blank" => Some(UnresolvedPolicy::Blank),
            "reject" => Some(UnresolvedPolicy::Reject),
            _ => None,
        }
    }

    /// Fail if this policy forbids signing the given resolution.
    pub fn enforce(&self, resolution: &Resolution) -> Result<(), AppError> {
        if *self == UnresolvedPolicy::Reject && !resolution.unresolved_keys.is_empty() {
            return Err(AppError::invalid(
                "content",
                format!(
                    "Waiver has unresolved merge fields: {}",
                    resolution.unresolved_keys.join(", ")
                ),
            ));
        }
        Ok(())
    }
}

/// Resolve placeholders, leaving unknown tokens verbatim.
pub fn resolve(
    template_content: &str,
    org_defaults: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> Resolution {
    resolve_with_policy(
        template_content,
        org_defaults,
        overrides,
        UnresolvedPolicy::LeaveVerbatim,
    )
}

/// Resolve placeholders under an explicit unresolved-key policy.
///
/// Precedence per occurrence: override, then organization default. The pass is
/// single and non-recursive. A token named like markup (`<p>`, `<b>`) is
/// replaced when a value exists for it and otherwise kept as markup without
/// being reported.
pub fn resolve_with_policy(
    template_content: &str,
    org_defaults: &HashMap<String, String>,
    overrides: &HashMap<String, String>,
    policy: UnresolvedPolicy,
) -> Resolution {
    let mut unresolved_keys: Vec<String> = Vec::new();

    let resolved_content = token::replace_placeholders(template_content, |key| {
        if let Some(value) = overrides.get(key).or_else(|| org_defaults.get(key)) {
            return Some(value.clone());
        }
        if token::is_markup_name(key) {
            return None;
        }
        if !unresolved_keys.iter().any(|k| k == key) {
            unresolved_keys.push(key.to_string());
        }
        match policy {
            UnresolvedPolicy::Blank => Some(String::new()),
            UnresolvedPolicy::LeaveVerbatim | UnresolvedPolicy::Reject => None,
        }
    });

    Resolution {
        resolved_content,
        unresolved_keys,
    }
}
