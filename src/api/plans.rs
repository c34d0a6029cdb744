//! Membership plan waiver requirements.

use axum::extract::{Path, State};
use serde::Serialize;

use super::{success, ApiResult};
use crate::models::WaiverTemplate;
use crate::AppState;

/// A plan-to-template link.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanWaiverLink {
    pub membership_plan_id: String,
    pub template_id: String,
}

/// GET /api/membership-plans/:planId/waivers - Active waivers the plan requires.
pub async fn list_plan_waivers(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> ApiResult<Vec<WaiverTemplate>> {
    success(state.repo.waivers_for_membership(&plan_id).await?)
}

/// PUT /api/membership-plans/:planId/waivers/:templateId
pub async fn link_plan_waiver(
    State(state): State<AppState>,
    Path((plan_id, template_id)): Path<(String, String)>,
) -> ApiResult<PlanWaiverLink> {
    state.repo.link_plan_waiver(&plan_id, &template_id).await?;
    success(PlanWaiverLink {
        membership_plan_id: plan_id,
        template_id,
    })
}

/// DELETE /api/membership-plans/:planId/waivers/:templateId
pub async fn unlink_plan_waiver(
    State(state): State<AppState>,
    Path((plan_id, template_id)): Path<(String, String)>,
) -> ApiResult<PlanWaiverLink> {
    state.repo.unlink_plan_waiver(&plan_id, &template_id).await?;
    success(PlanWaiverLink {
        membership_plan_id: plan_id,
        template_id,
    })
}
