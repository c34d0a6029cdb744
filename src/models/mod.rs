//! Data models for the waiver backend.
//!
//! Field names serialize in camelCase to match the signing wizard and admin clients.

mod merge_field;
mod signed_waiver;
mod template;

pub use merge_field::*;
pub use signed_waiver::*;
pub use template::*;

/// Number of characters in `s` (not bytes).
pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}
