//! Database models

use chrono::{DateTime, Utc};
use mailwave_common::types::{
    CampaignId, CampaignKind, CampaignState, CampaignStatus, ContactId, EventId, EventType,
    OwnerId, SegmentId, SendJobId, TrackingId,
};
use mailwave_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Campaign model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Campaign {
    pub id: CampaignId,
    pub owner_id: OwnerId,
    pub name: String,
    pub kind: String,
    pub state: String,
    pub status: String,
    pub subject: String,
    pub html_body: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub segment_id: SegmentId,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub ab_config: Option<serde_json::Value>,
    pub total_recipients: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Campaign {
    pub fn kind(&self) -> Result<CampaignKind> {
        self.kind.parse()
    }

    pub fn state(&self) -> Result<CampaignState> {
        self.state.parse()
    }

    pub fn status(&self) -> Result<CampaignStatus> {
        self.status.parse()
    }

    /// Parse the A/B configuration, if any
    pub fn ab_config(&self) -> Result<Option<AbConfig>> {
        match &self.ab_config {
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::Internal(format!("Malformed ab_config: {}", e))),
            None => Ok(None),
        }
    }

    /// Whether the user may still edit content and schedule
    pub fn is_editable(&self) -> bool {
        matches!(self.state.as_str(), "scheduled" | "pending")
    }
}

/// One variation of an A/B test campaign
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbVariation {
    pub id: String,
    pub subject: String,
    pub html_body: String,
}

/// Metric used to pick the A/B winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinnerCriteria {
    OpenRate,
    ClickRate,
    #[default]
    EngagementRate,
}

/// A/B test configuration stored on the campaign row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AbConfig {
    pub variations: Vec<AbVariation>,

    #[serde(default = "default_test_duration_hours")]
    pub test_duration_hours: i64,

    #[serde(default)]
    pub winner_criteria: WinnerCriteria,

    #[serde(default)]
    pub winner_id: Option<String>,

    #[serde(default)]
    pub winner_selected_at: Option<DateTime<Utc>>,
}

fn default_test_duration_hours() -> i64 {
    24
}

/// Input for creating a campaign
#[derive(Debug, Clone)]
pub struct CreateCampaign {
    pub owner_id: OwnerId,
    pub name: String,
    pub kind: CampaignKind,
    pub subject: String,
    pub html_body: String,
    pub from_address: String,
    pub from_name: Option<String>,
    pub segment_id: SegmentId,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub ab_config: Option<AbConfig>,
}

/// Input for updating a campaign (all fields optional)
#[derive(Debug, Clone, Default)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub subject: Option<String>,
    pub html_body: Option<String>,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub status: Option<CampaignStatus>,
}

/// Materialized campaign recipient
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Recipient {
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub email: String,
    pub delivery_status: String,
    pub variation_id: Option<String>,
    pub last_event_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Recipient {
    /// Queued recipients still have a send outstanding
    pub fn is_resolved(&self) -> bool {
        self.delivery_status != "queued"
    }
}

/// Input row for recipient materialization
#[derive(Debug, Clone)]
pub struct NewRecipient {
    pub contact_id: ContactId,
    pub email: String,
    pub variation_id: Option<String>,
}

/// Append-only tracking event
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct TrackingEvent {
    pub campaign_id: CampaignId,
    pub id: EventId,
    pub recipient_id: ContactId,
    pub email: Option<String>,
    pub event_type: String,
    pub variation_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub metadata: serde_json::Value,
}

impl TrackingEvent {
    pub fn event_type(&self) -> Result<EventType> {
        self.event_type.parse()
    }
}

/// Input for appending a tracking event
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub campaign_id: CampaignId,
    pub recipient_id: ContactId,
    pub email: Option<String>,
    pub event_type: EventType,
    pub variation_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub country: Option<String>,
    pub metadata: serde_json::Value,
}

impl NewEvent {
    pub fn new(
        campaign_id: CampaignId,
        recipient_id: ContactId,
        event_type: EventType,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            campaign_id,
            recipient_id,
            email: None,
            event_type,
            variation_id: None,
            occurred_at,
            user_agent: None,
            ip_address: None,
            country: None,
            metadata: serde_json::json!({}),
        }
    }
}

/// Durable send job
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SendJob {
    pub id: SendJobId,
    pub campaign_id: CampaignId,
    pub contact_id: ContactId,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub scheduled_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl SendJob {
    pub fn attempts_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }
}

/// Click-through link mapping
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LinkMapping {
    pub tracking_id: TrackingId,
    pub campaign_id: CampaignId,
    pub recipient_id: ContactId,
    pub link_id: String,
    pub original_url: String,
    pub variation_id: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Unsubscribe suppression row
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Unsubscribe {
    pub id: Uuid,
    pub campaign_id: Option<CampaignId>,
    pub email: String,
    pub recipient_id: Option<ContactId>,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

/// A contact belonging to an audience segment
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SegmentContact {
    pub segment_id: SegmentId,
    pub contact_id: ContactId,
    pub email: String,
    pub status: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_ab_config_defaults() {
        let config: AbConfig = serde_json::from_value(serde_json::json!({
            "variations": [
                {"id": "a", "subject": "Hi", "html_body": "<p>A</p>"},
                {"id": "b", "subject": "Hello", "html_body": "<p>B</p>"}
            ]
        }))
        .unwrap();

        assert_eq!(config.variations.len(), 2);
        assert_eq!(config.test_duration_hours, 24);
        assert_eq!(config.winner_criteria, WinnerCriteria::EngagementRate);
        assert_eq!(config.winner_id, None);
    }

    #[test]
    fn test_ab_config_criteria_parse() {
        let config: AbConfig = serde_json::from_value(serde_json::json!({
            "variations": [],
            "winner_criteria": "click_rate",
            "test_duration_hours": 4
        }))
        .unwrap();

        assert_eq!(config.winner_criteria, WinnerCriteria::ClickRate);
        assert_eq!(config.test_duration_hours, 4);
    }
}
