//! Signing and signed-record endpoints.

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    Json,
};
use chrono::Utc;

use super::{success, ApiResult};
use crate::errors::AppError;
use crate::models::{SignWaiverRequest, SignedWaiverRecord};
use crate::render::{self, DocumentInput, Download};
use crate::signing;
use crate::AppState;

/// POST /api/signed-waivers - Validate and record a signing.
pub async fn sign_waiver(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut request): Json<SignWaiverRequest>,
) -> ApiResult<SignedWaiverRecord> {
    if request.ip_address.is_none() {
        request.ip_address = client_ip(&headers);
    }
    if request.user_agent.is_none() {
        request.user_agent = header_value(&headers, header::USER_AGENT.as_str());
    }

    let record = signing::sign_waiver(
        &state.repo,
        &request,
        state.config.unresolved_policy,
        Utc::now(),
    )
    .await?;
    success(record)
}

/// GET /api/signed-waivers/:id
pub async fn get_signed_waiver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<SignedWaiverRecord> {
    success(require_signed(&state, &id).await?)
}

/// GET /api/signed-waivers/:id/document - Regenerate the PDF from the frozen record.
pub async fn download_signed_waiver(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Download, AppError> {
    let record = require_signed(&state, &id).await?;
    let input = DocumentInput::from_record(&record);

    let download =
        tokio::task::spawn_blocking(move || render::render_for_download(&input)).await??;
    tracing::info!(signed_waiver_id = %id, "Generated signed waiver document");
    Ok(download)
}

/// GET /api/members/:memberId/signed-waivers - Newest first.
pub async fn list_member_signed_waivers(
    State(state): State<AppState>,
    Path(member_id): Path<String>,
) -> ApiResult<Vec<SignedWaiverRecord>> {
    success(state.repo.list_signed_waivers_for_member(&member_id).await?)
}

async fn require_signed(state: &AppState, id: &str) -> Result<SignedWaiverRecord, AppError> {
    state
        .repo
        .get_signed_waiver(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Signed waiver {} not found", id)))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// First hop of `X-Forwarded-For`, else `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    header_value(headers, "x-forwarded-for")
        .and_then(|v| v.split(',').next().map(|hop| hop.trim().to_string()))
        .filter(|v| !v.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_client_ip_prefers_first_forwarded_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.2"));

        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn test_client_ip_absent() {
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }
}
