//! Waiver template API endpoints.

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{success, ApiResult, Deleted};
use crate::errors::AppError;
use crate::guardian::{age_on, allowed_relationships, requires_guardian};
use crate::merge::{resolve_with_policy, Resolution};
use crate::models::{
    CreateTemplateRequest, CreateVersionRequest, MembershipDetails, SignerRelationship,
    TemplateVersion, UpdateTemplateRequest, WaiverTemplate,
};
use crate::render::{self, DocumentInput, Download};
use crate::AppState;

/// Optional organization filter.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationQuery {
    pub organization_id: Option<String>,
}

/// GET /api/templates - List templates.
pub async fn list_templates(
    State(state): State<AppState>,
    Query(query): Query<OrganizationQuery>,
) -> ApiResult<Vec<WaiverTemplate>> {
    success(
        state
            .repo
            .list_templates(query.organization_id.as_deref())
            .await?,
    )
}

/// GET /api/templates/:id - Get a single template.
pub async fn get_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<WaiverTemplate> {
    success(state.repo.require_template(&id).await?)
}

/// POST /api/templates - Create a template and its version 1.
pub async fn create_template(
    State(state): State<AppState>,
    Json(request): Json<CreateTemplateRequest>,
) -> ApiResult<WaiverTemplate> {
    success(state.repo.create_template(&request).await?)
}

/// PUT /api/templates/:id - Update a template.
pub async fn update_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateTemplateRequest>,
) -> ApiResult<WaiverTemplate> {
    success(state.repo.update_template(&id, &request).await?)
}

/// DELETE /api/templates/:id - Soft-delete a template.
pub async fn delete_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    state.repo.delete_template(&id).await?;
    success(Deleted { id })
}

/// GET /api/templates/:id/versions - Version history, newest first.
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<TemplateVersion>> {
    success(state.repo.list_versions(&id).await?)
}

/// POST /api/templates/:id/versions - Content-only edit.
pub async fn create_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<CreateVersionRequest>,
) -> ApiResult<TemplateVersion> {
    success(
        state
            .repo
            .create_version(&id, &request.content, &request.actor)
            .await?,
    )
}

/// GET /api/template-versions/:id
pub async fn get_version(
    State(state): State<AppState>,
    Path(version_id): Path<String>,
) -> ApiResult<TemplateVersion> {
    match state.repo.get_version(&version_id).await? {
        Some(version) => success(version),
        None => Err(AppError::NotFound(format!(
            "Template version {} not found",
            version_id
        ))),
    }
}

/// Per-signing values that take precedence over organization defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResolveRequest {
    pub merge_field_overrides: HashMap<String, String>,
}

async fn resolve_template(
    state: &AppState,
    template: &WaiverTemplate,
    overrides: &HashMap<String, String>,
) -> Result<Resolution, AppError> {
    let defaults = state
        .repo
        .merge_field_defaults(&template.organization_id)
        .await?;
    Ok(resolve_with_policy(
        &template.content,
        &defaults,
        overrides,
        state.config.unresolved_policy,
    ))
}

/// POST /api/templates/:id/resolve - Resolve placeholders for display.
pub async fn resolve_template_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ResolveRequest>,
) -> ApiResult<Resolution> {
    let template = state.repo.require_template(&id).await?;
    success(resolve_template(&state, &template, &request.merge_field_overrides).await?)
}

/// Member data for an unsigned preview.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreviewRequest {
    pub organization_name: String,
    pub member_first_name: String,
    pub member_last_name: String,
    pub member_email: String,
    pub signed_by_name: Option<String>,
    pub signed_by_relationship: SignerRelationship,
    pub merge_field_overrides: HashMap<String, String>,
    pub membership: Option<MembershipDetails>,
}

/// POST /api/templates/:id/preview - Render the live template before signing.
pub async fn preview_template(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<PreviewRequest>,
) -> Result<Download, AppError> {
    let template = state.repo.require_template(&id).await?;
    let resolution = resolve_template(&state, &template, &request.merge_field_overrides).await?;

    let signed_by_name = request.signed_by_name.unwrap_or_else(|| {
        format!("{} {}", request.member_first_name, request.member_last_name)
            .trim()
            .to_string()
    });
    let input = DocumentInput {
        organization_name: request.organization_name,
        waiver_name: template.name,
        template_version: template.current_version,
        content: resolution.resolved_content,
        member_first_name: request.member_first_name,
        member_last_name: request.member_last_name,
        member_email: request.member_email,
        signature_asset: String::new(),
        signed_by_name,
        signed_by_relationship: request.signed_by_relationship,
        signed_at: Utc::now(),
        ip_address: None,
        membership: request.membership,
    };

    let download =
        tokio::task::spawn_blocking(move || render::render_for_download(&input)).await??;
    Ok(download)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianQuery {
    pub date_of_birth: Option<NaiveDate>,
    /// Evaluation date; today when omitted
    pub as_of: Option<NaiveDate>,
}

/// Guardian outcome for one member against one template.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianRequirement {
    pub requires_guardian: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub member_age: Option<i64>,
    pub guardian_age_threshold: i64,
    pub allowed_relationships: Vec<SignerRelationship>,
}

/// GET /api/templates/:id/guardian-requirement
pub async fn guardian_requirement(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<GuardianQuery>,
) -> ApiResult<GuardianRequirement> {
    let template = state.repo.require_template(&id).await?;
    let as_of = query.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let required = requires_guardian(template.guardian_policy(), query.date_of_birth, as_of);

    success(GuardianRequirement {
        requires_guardian: required,
        member_age: query.date_of_birth.map(|dob| age_on(dob, as_of)),
        guardian_age_threshold: template.guardian_age_threshold,
        allowed_relationships: allowed_relationships(required).to_vec(),
    })
}
