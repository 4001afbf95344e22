//! Campaign event and analytics handlers

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, TimeZone, Utc};
use mailwave_core::{aggregate, CampaignAnalytics};
use mailwave_storage::models::TrackingEvent;
use serde::{Deserialize, Serialize};
use tracing::error;
use uuid::Uuid;

use super::{internal_error, not_found, validation_error, ApiError};
use crate::auth::AuthContext;
use crate::AppState;

/// Query parameters for the event window
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Window start, seconds since the Unix epoch. Defaults to 0.
    pub from_epoch: Option<i64>,
    /// Window end, seconds since the Unix epoch. Defaults to now.
    pub to_epoch: Option<i64>,
    /// Restrict events and analytics to one A/B variation
    pub variation_id: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    10_000
}

const MAX_LIMIT: i64 = 50_000;

/// Events plus the analytics computed over them
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub campaign_id: Uuid,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub variation_id: Option<String>,
    pub events: Vec<TrackingEvent>,
    pub analytics: CampaignAnalytics,
}

fn epoch_secs(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

/// Get events and analytics for a campaign
///
/// GET /api/v1/campaigns/:campaign_id/events
pub async fn get_events(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Path(campaign_id): Path<Uuid>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    // Ownership check before touching the event stream
    state
        .campaign_repo
        .get_by_owner(auth.owner_id, campaign_id)
        .await
        .map_err(|e| {
            error!("Failed to get campaign: {}", e);
            internal_error("Failed to get campaign")
        })?
        .ok_or_else(|| not_found("Campaign not found"))?;

    let from = match query.from_epoch {
        Some(secs) => epoch_secs(secs).ok_or_else(|| validation_error("from_epoch out of range"))?,
        None => Utc.timestamp_opt(0, 0).single().unwrap_or_default(),
    };
    let to = match query.to_epoch {
        Some(secs) => epoch_secs(secs).ok_or_else(|| validation_error("to_epoch out of range"))?,
        None => Utc::now(),
    };

    if to < from {
        return Err(validation_error("to_epoch must not precede from_epoch"));
    }

    let limit = query.limit.clamp(1, MAX_LIMIT);

    let events = state
        .event_repo
        .list_range(campaign_id, from, to, query.variation_id.as_deref(), limit)
        .await
        .map_err(|e| {
            error!("Failed to list events: {}", e);
            internal_error("Failed to list events")
        })?;

    let analytics = aggregate(&events);

    Ok(Json(EventsResponse {
        campaign_id,
        from,
        to,
        variation_id: query.variation_id,
        events,
        analytics,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_epoch_parameters_are_seconds() {
        let dt = epoch_secs(1_700_000_000).unwrap();
        assert_eq!(dt.to_rfc3339(), "2023-11-14T22:13:20+00:00");
    }

    #[test]
    fn test_epoch_out_of_range_rejected() {
        assert!(epoch_secs(i64::MAX).is_none());
    }
}
