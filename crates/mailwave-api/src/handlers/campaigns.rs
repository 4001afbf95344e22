//! Campaign handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use mailwave_common::types::{CampaignKind, CampaignState};
use mailwave_core::CampaignError;
use mailwave_storage::models::{AbConfig, Campaign, CreateCampaign, UpdateCampaign};
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

use super::{conflict, internal_error, not_found, validation_error, ApiError};
use crate::auth::AuthContext;
use crate::AppState;

/// Query parameters for listing campaigns
#[derive(Debug, Deserialize)]
pub struct ListCampaignsQuery {
    pub state: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Campaign list response
#[derive(Debug, Serialize)]
pub struct CampaignListResponse {
    pub data: Vec<CampaignResponse>,
    pub limit: i64,
    pub offset: i64,
}

/// Campaign response
#[derive(Debug, Serialize)]
pub struct CampaignResponse {
    pub id: Uuid,
    pub name: String,
    pub kind: String,
    pub state: String,
    pub status: String,
    pub subject: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub segment_id: Uuid,
    pub total_recipients: i32,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub ab_config: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Campaign> for CampaignResponse {
    fn from(c: Campaign) -> Self {
        Self {
            id: c.id,
            name: c.name,
            kind: c.kind,
            state: c.state,
            status: c.status,
            subject: c.subject,
            from_address: c.from_address,
            from_name: c.from_name,
            segment_id: c.segment_id,
            total_recipients: c.total_recipients,
            scheduled_at: c.scheduled_at,
            ab_config: c.ab_config,
            started_at: c.started_at,
            completed_at: c.completed_at,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

/// Request body for creating a campaign
#[derive(Debug, Deserialize)]
pub struct CreateCampaignRequest {
    pub name: String,
    pub kind: CampaignKind,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub html_body: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub segment_id: Uuid,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub ab_config: Option<AbConfig>,
}

/// Request body for updating a campaign
#[derive(Debug, Deserialize)]
pub struct UpdateCampaignRequest {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

fn campaign_error(e: CampaignError) -> ApiError {
    match e {
        CampaignError::NotFound => not_found("Campaign not found"),
        CampaignError::NotEditable => conflict("Campaign can no longer be edited"),
        CampaignError::Validation(msg) => validation_error(&msg),
        CampaignError::Database(e) => {
            error!("Database error: {}", e);
            internal_error("Database error")
        }
        CampaignError::Storage(e) => {
            error!("Storage error: {}", e);
            internal_error("Storage error")
        }
    }
}

/// List campaigns
///
/// GET /api/v1/campaigns
pub async fn list_campaigns(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ListCampaignsQuery>,
) -> Result<Json<CampaignListResponse>, ApiError> {
    let campaign_state = query.state.and_then(|s| s.parse::<CampaignState>().ok());

    let campaigns = state
        .campaign_repo
        .list_by_owner(auth.owner_id, campaign_state, query.limit, query.offset)
        .await
        .map_err(|e| {
            error!("Failed to list campaigns: {}", e);
            internal_error("Failed to list campaigns")
        })?;

    let data = campaigns.into_iter().map(CampaignResponse::from).collect();

    Ok(Json(CampaignListResponse {
        data,
        limit: query.limit,
        offset: query.offset,
    }))
}

/// Create a new campaign
///
/// POST /api/v1/campaigns
pub async fn create_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(input): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<CampaignResponse>), ApiError> {
    let create_input = CreateCampaign {
        owner_id: auth.owner_id,
        name: input.name,
        kind: input.kind,
        subject: input.subject,
        html_body: input.html_body,
        from_address: input.from_address,
        from_name: input.from_name,
        segment_id: input.segment_id,
        scheduled_at: input.scheduled_at,
        ab_config: input.ab_config,
    };

    let campaign = state
        .manager
        .create(create_input)
        .await
        .map_err(campaign_error)?;

    info!("Created campaign {} for owner {}", campaign.id, auth.owner_id);

    Ok((StatusCode::CREATED, Json(CampaignResponse::from(campaign))))
}

/// Get a campaign by ID
///
/// GET /api/v1/campaigns/:campaign_id
pub async fn get_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let campaign = state
        .campaign_repo
        .get_by_owner(auth.owner_id, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal_error("Failed to get campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Update a campaign
///
/// PUT /api/v1/campaigns/:campaign_id
pub async fn update_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
    Json(input): Json<UpdateCampaignRequest>,
) -> Result<Json<CampaignResponse>, ApiError> {
    let status = match input.status {
        Some(s) => Some(
            s.parse()
                .map_err(|_| validation_error("status must be 'active' or 'inactive'"))?,
        ),
        None => None,
    };

    let update_input = UpdateCampaign {
        name: input.name,
        subject: input.subject,
        html_body: input.html_body,
        from_address: input.from_address,
        from_name: input.from_name,
        scheduled_at: input.scheduled_at,
        status,
    };

    let campaign = state
        .campaign_repo
        .update(campaign_id, auth.owner_id, update_input)
        .await
        .map_err(|e| {
            error!("Failed to update campaign: {}", e);
            internal_error("Failed to update campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    Ok(Json(CampaignResponse::from(campaign)))
}

/// Delete a campaign
///
/// DELETE /api/v1/campaigns/:campaign_id
pub async fn delete_campaign(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    let deleted = state
        .campaign_repo
        .delete(campaign_id, auth.owner_id)
        .await
        .map_err(|e| {
            error!("Failed to delete campaign: {}", e);
            internal_error("Failed to delete campaign")
        })?;

    if deleted {
        info!("Deleted campaign {}", campaign_id);
        Ok(StatusCode::NO_CONTENT)
    } else {
        // Either missing or still sending
        Err(not_found("Campaign not found or currently sending"))
    }
}

/// A/B evaluation response
#[derive(Debug, Serialize)]
pub struct EvaluateAbResponse {
    pub campaign_id: Uuid,
    /// Winner committed by this evaluation, or null when a winner was
    /// already decided or the campaign is not evaluable yet
    pub winner_id: Option<String>,
}

/// Trigger A/B test evaluation for a campaign
///
/// POST /api/v1/campaigns/:campaign_id/ab/evaluate
pub async fn evaluate_ab_test(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
) -> Result<Json<EvaluateAbResponse>, ApiError> {
    let campaign = state
        .campaign_repo
        .get_by_owner(auth.owner_id, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal_error("Failed to get campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    if campaign.kind != CampaignKind::AbTest.to_string() {
        return Err(validation_error("Campaign is not an A/B test"));
    }

    let winner_id = state.orchestrator.evaluate(&campaign).await.map_err(|e| {
        error!("Failed to evaluate A/B test {}: {}", campaign_id, e);
        internal_error("Failed to evaluate A/B test")
    })?;

    Ok(Json(EvaluateAbResponse {
        campaign_id,
        winner_id,
    }))
}
