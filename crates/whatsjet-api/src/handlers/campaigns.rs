//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use whatsjet_common::types::{CampaignId, CampaignStatus, CampaignType, Paginated, Pagination};
use whatsjet_common::TenantContext;
use whatsjet_storage::models::{
    AudienceDescriptor, Campaign, CampaignFilter, CampaignStats, CreateCampaign, MessagePayload,
    ScheduleDescriptor, UpdateCampaign,
};

use super::{api_error, error_response, ApiResult};
use crate::auth::AppState;

const MAX_PAGE_SIZE: u32 = 100;

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub status: Option<String>,
    pub search: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    50
}

/// Campaign with its derived progress
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    #[serde(flatten)]
    pub campaign: Campaign,
    pub progress_percentage: f64,
}

impl From<Campaign> for CampaignResponse {
    fn from(campaign: Campaign) -> Self {
        Self {
            progress_percentage: campaign.progress_percentage(),
            campaign,
        }
    }
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub description: Option<String>,
    pub campaign_type: CampaignType,
    pub audience: AudienceDescriptor,
    pub message: MessagePayload,
    #[serde(default = "default_schedule")]
    pub schedule: ScheduleDescriptor,
}

fn default_schedule() -> ScheduleDescriptor {
    ScheduleDescriptor::Immediate
}

/// Request body for a status change
#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CampaignStatus,
    /// Fail a RUNNING or PAUSED campaign even with pending recipients
    #[serde(default)]
    pub force: bool,
    pub reason: Option<String>,
}

/// Request body for deleting campaigns
#[derive(Debug, Deserialize)]
pub struct DeleteCampaignsRequest {
    pub ids: Vec<CampaignId>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteCampaignsResponse {
    pub deleted: u64,
}

/// Delivery statistics
#[derive(Debug, Serialize)]
pub struct CampaignStatsResponse {
    pub campaign_id: CampaignId,
    pub status: CampaignStatus,
    #[serde(flatten)]
    pub stats: CampaignStats,
    pub progress_percentage: f64,
    pub failure_reason: Option<String>,
}

/// List campaigns
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Query(query): Query<ListCampaignsQuery>,
) -> ApiResult<Json<Paginated<CampaignResponse>>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<CampaignStatus>)
        .transpose()
        .map_err(api_error)?;

    let filter = CampaignFilter {
        status,
        search: query.search.filter(|s| !s.trim().is_empty()),
    };
    let pagination = Pagination {
        page: query.page.max(1),
        limit: query.limit.clamp(1, MAX_PAGE_SIZE),
    };

    let page = state
        .manager
        .list_campaigns(&ctx, &filter, pagination)
        .await
        .map_err(api_error)?;

    Ok(Json(Paginated {
        data: page.data.into_iter().map(CampaignResponse::from).collect(),
        total: page.total,
        page: page.page,
        limit: page.limit,
        pages: page.pages,
    }))
}

/// Create a campaign in DRAFT
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<CreateCampaignRequest>,
) -> ApiResult<(StatusCode, Json<CampaignResponse>)> {
    let campaign = state
        .manager
        .create_campaign(
            &ctx,
            CreateCampaign {
                name: req.name,
                description: req.description,
                campaign_type: req.campaign_type,
                audience: req.audience,
                message: req.message,
                schedule: req.schedule,
                parent_campaign_id: None,
            },
        )
        .await
        .map_err(api_error)?;

    info!(vendor_id = %ctx.vendor_id, campaign_id = %campaign.id, "Campaign created via API");
    Ok((StatusCode::CREATED, Json(campaign.into())))
}

/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(campaign_id): Path<CampaignId>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = state
        .manager
        .get_campaign(&ctx, campaign_id)
        .await
        .map_err(api_error)?;
    Ok(Json(campaign.into()))
}

/// Update a draft
///
/// PUT /api/v1/campaigns/:campaign_id
pub async fn update_campaign(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(campaign_id): Path<CampaignId>,
    Json(req): Json<UpdateCampaign>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = state
        .manager
        .update_campaign(&ctx, campaign_id, req)
        .await
        .map_err(api_error)?;
    Ok(Json(campaign.into()))
}

/// Soft-delete drafts; other ids are skipped
///
/// DELETE /api/v1/campaigns
pub async fn delete_campaigns(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Json(req): Json<DeleteCampaignsRequest>,
) -> ApiResult<Json<DeleteCampaignsResponse>> {
    if req.ids.is_empty() {
        return Err(error_response(
            StatusCode::UNPROCESSABLE_ENTITY,
            "VALIDATION_ERROR",
            "ids must not be empty",
        ));
    }
    let deleted = state
        .manager
        .delete_campaigns(&ctx, &req.ids)
        .await
        .map_err(api_error)?;
    Ok(Json(DeleteCampaignsResponse { deleted }))
}

/// DELETE /api/v1/campaigns/:campaign_id
pub async fn delete_campaign(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(campaign_id): Path<CampaignId>,
) -> ApiResult<StatusCode> {
    let campaign = state
        .manager
        .get_campaign(&ctx, campaign_id)
        .await
        .map_err(api_error)?;
    if campaign.status != CampaignStatus::Draft {
        return Err(error_response(
            StatusCode::CONFLICT,
            "CONFLICT",
            format!("Only DRAFT campaigns can be deleted (status is {})", campaign.status),
        ));
    }
    state
        .manager
        .delete_campaigns(&ctx, &[campaign_id])
        .await
        .map_err(api_error)?;
    Ok(StatusCode::NO_CONTENT)
}

/// Move a campaign through its lifecycle
///
/// PATCH /api/v1/campaigns/:campaign_id/status
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(campaign_id): Path<CampaignId>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<CampaignResponse>> {
    let campaign = if req.force {
        if req.status != CampaignStatus::Failed {
            return Err(error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                "VALIDATION_ERROR",
                "force is only supported when failing a campaign",
            ));
        }
        let reason = req
            .reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Failed by operator".to_string());
        state
            .manager
            .fail_campaign(&ctx, campaign_id, &reason)
            .await
    } else {
        state
            .manager
            .transition_status(&ctx, campaign_id, req.status)
            .await
    }
    .map_err(api_error)?;

    Ok(Json(campaign.into()))
}

/// GET /api/v1/campaigns/:campaign_id/stats
pub async fn get_campaign_stats(
    State(state): State<Arc<AppState>>,
    Extension(ctx): Extension<TenantContext>,
    Path(campaign_id): Path<CampaignId>,
) -> ApiResult<Json<CampaignStatsResponse>> {
    let campaign = state
        .manager
        .get_campaign(&ctx, campaign_id)
        .await
        .map_err(api_error)?;

    Ok(Json(CampaignStatsResponse {
        campaign_id: campaign.id,
        status: campaign.status,
        progress_percentage: campaign.progress_percentage(),
        stats: campaign.stats,
        failure_reason: campaign.failure_reason,
    }))
}
