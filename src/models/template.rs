//! Waiver template and template version models.

use serde::{Deserialize, Serialize};

use super::char_len;
use crate::errors::{AppError, FieldError};
use crate::guardian::{GuardianPolicy, MAX_GUARDIAN_AGE_THRESHOLD, MIN_GUARDIAN_AGE_THRESHOLD};

pub const MAX_TEMPLATE_NAME_LEN: usize = 100;
pub const MIN_TEMPLATE_CONTENT_LEN: usize = 100;
pub const MAX_TEMPLATE_CONTENT_LEN: usize = 50_000;
pub const MAX_DESCRIPTION_LEN: usize = 500;
pub const DEFAULT_GUARDIAN_AGE_THRESHOLD: i64 = 18;

/// An authored waiver, owned by one organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaiverTemplate {
    pub id: String,
    pub organization_id: String,
    pub name: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    pub is_default: bool,
    pub requires_guardian: bool,
    pub guardian_age_threshold: i64,
    pub current_version: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl WaiverTemplate {
    pub fn guardian_policy(&self) -> GuardianPolicy {
        GuardianPolicy {
            requires_guardian: self.requires_guardian,
            guardian_age_threshold: self.guardian_age_threshold,
        }
    }
}

/// An immutable snapshot of a template at one version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateVersion {
    pub id: String,
    pub template_id: String,
    pub version: i64,
    pub name: String,
    pub content_snapshot: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub requires_guardian: bool,
    pub guardian_age_threshold: i64,
    pub created_by: String,
    pub created_at: String,
}

/// Request body for creating a waiver template.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTemplateRequest {
    pub organization_id: String,
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub requires_guardian: bool,
    #[serde(default = "default_threshold")]
    pub guardian_age_threshold: i64,
    /// Who is creating the template; recorded on version 1
    #[serde(default = "default_actor")]
    pub actor: String,
}

fn default_true() -> bool {
    true
}

fn default_threshold() -> i64 {
    DEFAULT_GUARDIAN_AGE_THRESHOLD
}

fn default_actor() -> String {
    "system".to_string()
}

impl CreateTemplateRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        if self.organization_id.trim().is_empty() {
            errors.push(FieldError::new("organizationId", "Organization is required"));
        }
        check_name(&self.name, &mut errors);
        check_content(&self.content, &mut errors);
        check_description(self.description.as_deref(), &mut errors);
        check_threshold(self.guardian_age_threshold, &mut errors);
        into_result(errors)
    }
}

/// Request body for updating a template. Omitted fields keep their value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTemplateRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_default: Option<bool>,
    #[serde(default)]
    pub requires_guardian: Option<bool>,
    #[serde(default)]
    pub guardian_age_threshold: Option<i64>,
    #[serde(default = "default_actor")]
    pub actor: String,
}

impl UpdateTemplateRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        let mut errors = Vec::new();
        if let Some(name) = &self.name {
            check_name(name, &mut errors);
        }
        if let Some(content) = &self.content {
            check_content(content, &mut errors);
        }
        check_description(self.description.as_deref(), &mut errors);
        if let Some(threshold) = self.guardian_age_threshold {
            check_threshold(threshold, &mut errors);
        }
        into_result(errors)
    }
}

/// Request body for a content-only edit.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVersionRequest {
    pub content: String,
    #[serde(default = "default_actor")]
    pub actor: String,
}

/// Template content must be within the length bounds.
pub fn validate_content(content: &str) -> Result<(), AppError> {
    let mut errors = Vec::new();
    check_content(content, &mut errors);
    into_result(errors)
}

fn check_name(name: &str, errors: &mut Vec<FieldError>) {
    if name.trim().is_empty() {
        errors.push(FieldError::new("name", "Name is required"));
    } else if char_len(name) > MAX_TEMPLATE_NAME_LEN {
        errors.push(FieldError::new(
            "name",
            format!("Name must be at most {} characters", MAX_TEMPLATE_NAME_LEN),
        ));
    }
}

fn check_content(content: &str, errors: &mut Vec<FieldError>) {
    let len = char_len(content);
    if !(MIN_TEMPLATE_CONTENT_LEN..=MAX_TEMPLATE_CONTENT_LEN).contains(&len) {
        errors.push(FieldError::new(
            "content",
            format!(
                "Content must be between {} and {} characters (got {})",
                MIN_TEMPLATE_CONTENT_LEN, MAX_TEMPLATE_CONTENT_LEN, len
            ),
        ));
    }
}

fn check_description(description: Option<&str>, errors: &mut Vec<FieldError>) {
    if let Some(description) = description {
        if char_len(description) > MAX_DESCRIPTION_LEN {
            errors.push(FieldError::new(
                "description",
                format!("Description must be at most {} characters", MAX_DESCRIPTION_LEN),
            ));
        }
    }
}

fn check_threshold(threshold: i64, errors: &mut Vec<FieldError>) {
    if !(MIN_GUARDIAN_AGE_THRESHOLD..=MAX_GUARDIAN_AGE_THRESHOLD).contains(&threshold) {
        errors.push(FieldError::new(
            "guardianAgeThreshold",
            format!(
                "Guardian age threshold must be between {} and {}",
                MIN_GUARDIAN_AGE_THRESHOLD, MAX_GUARDIAN_AGE_THRESHOLD
            ),
        ));
    }
}

pub(crate) fn into_result(errors: Vec<FieldError>) -> Result<(), AppError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(AppError::Validation(errors))
    }
}
