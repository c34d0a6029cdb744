//! Organization-scoped merge field model.

use serde::{Deserialize, Serialize};

use super::char_len;
use super::template::into_result;
use crate::errors::{AppError, FieldError};
use crate::merge::token;

pub const MAX_LABEL_LEN: usize = 100;
pub const MAX_DEFAULT_VALUE_LEN: usize = 500;
pub const MAX_MERGE_FIELD_DESCRIPTION_LEN: usize = 500;

/// A named value substitutable into waiver text through a `<key>` token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeField {
    pub id: String,
    pub organization_id: String,
    pub key: String,
    pub label: String,
    pub default_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Request body for creating a merge field.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMergeFieldRequest {
    pub organization_id: String,
    pub key: String,
    pub label: String,
    pub default_value: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateMergeFieldRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        if self.organization_id.trim().is_empty() {
            errors.push(FieldError::new("organizationId", "Organization is required"));
        }
        check_key(&self.key, &mut errors);
        check_label(&self.label, &mut errors);
        check_default_value(&self.default_value, &mut errors);
        check_description(self.description.as_deref(), &mut errors);
        into_result(errors)
    }
}

/// Request body for updating a merge field.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMergeFieldRequest {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl UpdateMergeFieldRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        if let Some(key) = &self.key {
            check_key(key, &mut errors);
        }
        if let Some(label) = &self.label {
            check_label(label, &mut errors);
        }
        if let Some(value) = &self.default_value {
            check_default_value(value, &mut errors);
        }
        check_description(self.description.as_deref(), &mut errors);
        into_result(errors)
    }
}

fn check_key(key: &str, errors: &mut Vec<FieldError>) {
    if let Err(e) = token::check_key(key) {
        errors.push(FieldError::new("key", e.message()));
    }
}

fn check_label(label: &str, errors: &mut Vec<FieldError>) {
    if label.trim().is_empty() {
        errors.push(FieldError::new("label", "Label is required"));
    } else if char_len(label) > MAX_LABEL_LEN {
        errors.push(FieldError::new(
            "label",
            format!("Label must be at most {} characters", MAX_LABEL_LEN),
        ));
    }
}

fn check_default_value(value: &str, errors: &mut Vec<FieldError>) {
    let len = char_len(value);
    if len == 0 || len > MAX_DEFAULT_VALUE_LEN {
        errors.push(FieldError::new(
            "defaultValue",
            format!("Default value must be 1 to {} characters", MAX_DEFAULT_VALUE_LEN),
        ));
    }
}

fn check_description(description: Option<&str>, errors: &mut Vec<FieldError>) {
    if description.is_some_and(|d| char_len(d) > MAX_MERGE_FIELD_DESCRIPTION_LEN) {
        errors.push(FieldError::new(
            "description",
            format!(
                "Description must be at most {} characters",
                MAX_MERGE_FIELD_DESCRIPTION_LEN
            ),
        ));
    }
}
