//! Merge field API endpoints.

use axum::{
    extract::{Path, Query, State},
    Json,
};

use super::{success, ApiResult, Deleted, OrganizationQuery};
use crate::errors::AppError;
use crate::models::{CreateMergeFieldRequest, MergeField, UpdateMergeFieldRequest};
use crate::AppState;

/// GET /api/merge-fields?organizationId= - List an organization's merge fields.
pub async fn list_merge_fields(
    State(state): State<AppState>,
    Query(query): Query<OrganizationQuery>,
) -> ApiResult<Vec<MergeField>> {
    let organization_id = query
        .organization_id
        .filter(|org| !org.trim().is_empty())
        .ok_or_else(|| AppError::invalid("organizationId", "Organization is required"))?;

    success(state.repo.list_merge_fields(&organization_id).await?)
}

/// GET /api/merge-fields/:id
pub async fn get_merge_field(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<MergeField> {
    match state.repo.get_merge_field(&id).await? {
        Some(field) => success(field),
        None => Err(AppError::NotFound(format!("Merge field {} not found", id))),
    }
}

/// POST /api/merge-fields
pub async fn create_merge_field(
    State(state): State<AppState>,
    Json(request): Json<CreateMergeFieldRequest>,
) -> ApiResult<MergeField> {
    success(state.repo.create_merge_field(&request).await?)
}

/// PUT /api/merge-fields/:id
pub async fn update_merge_field(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<UpdateMergeFieldRequest>,
) -> ApiResult<MergeField> {
    success(state.repo.update_merge_field(&id, &request).await?)
}

/// DELETE /api/merge-fields/:id
pub async fn delete_merge_field(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    state.repo.delete_merge_field(&id).await?;
    success(Deleted { id })
}
