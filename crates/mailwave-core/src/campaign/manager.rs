//! Campaign Manager - Handles campaign lifecycle and materialization

use chrono::{DateTime, Utc};
use mailwave_common::types::{CampaignKind, CampaignState, CampaignStatus, EmailAddress};
use mailwave_storage::db::DatabasePool;
use mailwave_storage::models::{Campaign, CreateCampaign, NewRecipient};
use mailwave_storage::repository::{CampaignRepository, SegmentDirectory, UnsubscribeRepository};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::abtest::assign_variation;

/// Campaign manager errors
#[derive(Error, Debug)]
pub enum CampaignError {
    #[error("Campaign not found")]
    NotFound,

    #[error("Campaign can no longer be edited")]
    NotEditable,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Storage(#[from] mailwave_common::Error),
}

/// Campaign Manager - Manages campaign lifecycle
pub struct CampaignManager {
    campaign_repo: CampaignRepository,
    unsubscribe_repo: UnsubscribeRepository,
    segments: Arc<dyn SegmentDirectory>,
    max_attempts: i32,
}

impl CampaignManager {
    /// Create a new campaign manager
    pub fn new(db_pool: DatabasePool, segments: Arc<dyn SegmentDirectory>, max_attempts: i32) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            unsubscribe_repo: UnsubscribeRepository::new(pool),
            segments,
            max_attempts,
        }
    }

    /// Validate a create request. Immediate campaigns must not carry a
    /// schedule, scheduled ones need a future schedule, and A/B tests need
    /// two or three distinct non-empty variations.
    pub fn validate_create(input: &CreateCampaign, now: DateTime<Utc>) -> Result<(), CampaignError> {
        if input.name.trim().is_empty() {
            return Err(CampaignError::Validation("name must not be empty".into()));
        }
        if EmailAddress::parse(input.from_address.trim()).is_none() {
            return Err(CampaignError::Validation(
                "from_address must be a valid email address".into(),
            ));
        }

        match input.kind {
            CampaignKind::Immediate => {
                if input.scheduled_at.is_some() {
                    return Err(CampaignError::Validation(
                        "immediate campaigns cannot have scheduled_at".into(),
                    ));
                }
            }
            CampaignKind::Scheduled => match input.scheduled_at {
                None => {
                    return Err(CampaignError::Validation(
                        "scheduled campaigns require scheduled_at".into(),
                    ));
                }
                Some(at) if at <= now => {
                    return Err(CampaignError::Validation(
                        "scheduled_at must be in the future".into(),
                    ));
                }
                Some(_) => {}
            },
            CampaignKind::AbTest => {
                let config = input.ab_config.as_ref().ok_or_else(|| {
                    CampaignError::Validation("ab_test campaigns require ab_config".into())
                })?;

                if !(2..=3).contains(&config.variations.len()) {
                    return Err(CampaignError::Validation(
                        "ab_config requires 2 or 3 variations".into(),
                    ));
                }

                let mut seen = HashSet::new();
                for variation in &config.variations {
                    if variation.id.trim().is_empty()
                        || variation.subject.trim().is_empty()
                        || variation.html_body.trim().is_empty()
                    {
                        return Err(CampaignError::Validation(
                            "every variation needs an id, subject and body".into(),
                        ));
                    }
                    if !seen.insert(variation.id.as_str()) {
                        return Err(CampaignError::Validation(format!(
                            "duplicate variation id: {}",
                            variation.id
                        )));
                    }
                }

                if config.test_duration_hours <= 0 {
                    return Err(CampaignError::Validation(
                        "test_duration_hours must be positive".into(),
                    ));
                }
            }
        }

        if input.kind != CampaignKind::AbTest
            && (input.subject.trim().is_empty() || input.html_body.trim().is_empty())
        {
            return Err(CampaignError::Validation(
                "subject and html_body must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Validate and create a campaign
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign, CampaignError> {
        Self::validate_create(&input, Utc::now())?;
        Ok(self.campaign_repo.create(input).await?)
    }

    /// Whether the trigger may pick this campaign up: it must still be
    /// awaiting its start and be active. An inactive campaign stays parked
    /// until reactivated; one that already reached sending finishes under
    /// the dispatcher regardless of status.
    pub fn should_start(campaign: &Campaign) -> Result<bool, CampaignError> {
        let awaiting = matches!(
            campaign.state()?,
            CampaignState::Scheduled | CampaignState::Pending
        );
        Ok(awaiting && campaign.status()? == CampaignStatus::Active)
    }

    /// Start a campaign: resolve the segment, drop suppressed addresses,
    /// assign variations, then claim the sending state and materialize
    /// recipients and send jobs in one transaction. Safe to call
    /// concurrently; only the caller that wins the state claim commits.
    pub async fn start(&self, campaign: &Campaign) -> Result<(), CampaignError> {
        if !Self::should_start(campaign)? {
            return Ok(());
        }
        let current = campaign.state()?;

        let contacts = self.segments.contacts(campaign.segment_id).await?;
        if contacts.is_empty() {
            warn!("Campaign {} has an empty segment, failing", campaign.id);
            self.campaign_repo
                .update_state(campaign.id, current, CampaignState::Failed)
                .await?;
            return Ok(());
        }

        // Drop suppressed addresses before materialization
        let emails: Vec<String> = contacts.iter().map(|c| c.email.clone()).collect();
        let suppressed: HashSet<String> = self
            .unsubscribe_repo
            .suppressed_among(&emails)
            .await?
            .into_iter()
            .collect();

        let variation_ids: Vec<String> = match campaign.ab_config()? {
            Some(config) => config.variations.iter().map(|v| v.id.clone()).collect(),
            None => Vec::new(),
        };

        let recipients: Vec<NewRecipient> = contacts
            .into_iter()
            .filter(|c| !suppressed.contains(&c.email))
            .map(|c| NewRecipient {
                contact_id: c.contact_id,
                email: c.email,
                variation_id: assign_variation(&variation_ids, c.contact_id),
            })
            .collect();

        if recipients.is_empty() {
            warn!(
                "Campaign {} has no deliverable recipients after suppression, failing",
                campaign.id
            );
            self.campaign_repo
                .update_state(campaign.id, current, CampaignState::Failed)
                .await?;
            return Ok(());
        }

        let claimed = self
            .campaign_repo
            .start_sending(campaign.id, current, &recipients, self.max_attempts)
            .await?;

        if claimed.is_none() {
            // Lost the race to another scheduler tick
            return Ok(());
        }

        info!(
            "Campaign {} started sending to {} recipients",
            campaign.id,
            recipients.len()
        );

        Ok(())
    }

    /// Get scheduled campaigns ready to start
    pub async fn get_scheduled_ready(&self) -> Result<Vec<Campaign>, CampaignError> {
        Ok(self.campaign_repo.get_scheduled_ready().await?)
    }

    /// Get pending immediate campaigns
    pub async fn get_pending(&self) -> Result<Vec<Campaign>, CampaignError> {
        Ok(self.campaign_repo.get_pending().await?)
    }

    /// Look up a campaign by id
    pub async fn get(&self, id: Uuid) -> Result<Campaign, CampaignError> {
        self.campaign_repo
            .get(id)
            .await?
            .ok_or(CampaignError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use mailwave_storage::models::{AbConfig, AbVariation, WinnerCriteria};
    use uuid::Uuid;

    fn base_input(kind: CampaignKind) -> CreateCampaign {
        CreateCampaign {
            owner_id: Uuid::new_v4(),
            name: "Summer Sale".to_string(),
            kind,
            subject: "Big savings".to_string(),
            html_body: "<p>Hello</p>".to_string(),
            from_address: "news@example.com".to_string(),
            from_name: Some("Example".to_string()),
            segment_id: Uuid::new_v4(),
            scheduled_at: None,
            ab_config: None,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 12, 0, 0).unwrap()
    }

    fn stored_campaign(state: &str, status: &str) -> Campaign {
        Campaign {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "Summer Sale".to_string(),
            kind: "immediate".to_string(),
            state: state.to_string(),
            status: status.to_string(),
            subject: "Big savings".to_string(),
            html_body: "<p>Hello</p>".to_string(),
            from_address: "news@example.com".to_string(),
            from_name: None,
            segment_id: Uuid::new_v4(),
            scheduled_at: None,
            ab_config: None,
            total_recipients: 0,
            created_at: now(),
            updated_at: now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn ab_config(ids: &[&str]) -> AbConfig {
        AbConfig {
            variations: ids
                .iter()
                .map(|id| AbVariation {
                    id: id.to_string(),
                    subject: format!("Subject {}", id),
                    html_body: format!("<p>{}</p>", id),
                })
                .collect(),
            test_duration_hours: 24,
            winner_criteria: WinnerCriteria::EngagementRate,
            winner_id: None,
            winner_selected_at: None,
        }
    }

    #[test]
    fn test_immediate_rejects_schedule() {
        let mut input = base_input(CampaignKind::Immediate);
        assert!(CampaignManager::validate_create(&input, now()).is_ok());

        input.scheduled_at = Some(now() + Duration::hours(1));
        assert!(matches!(
            CampaignManager::validate_create(&input, now()),
            Err(CampaignError::Validation(_))
        ));
    }

    #[test]
    fn test_scheduled_requires_future_time() {
        let mut input = base_input(CampaignKind::Scheduled);
        assert!(matches!(
            CampaignManager::validate_create(&input, now()),
            Err(CampaignError::Validation(_))
        ));

        input.scheduled_at = Some(now() - Duration::hours(1));
        assert!(CampaignManager::validate_create(&input, now()).is_err());

        input.scheduled_at = Some(now() + Duration::hours(1));
        assert!(CampaignManager::validate_create(&input, now()).is_ok());
    }

    #[test]
    fn test_ab_test_variation_count() {
        let mut input = base_input(CampaignKind::AbTest);
        input.ab_config = Some(ab_config(&["a"]));
        assert!(CampaignManager::validate_create(&input, now()).is_err());

        input.ab_config = Some(ab_config(&["a", "b"]));
        assert!(CampaignManager::validate_create(&input, now()).is_ok());

        input.ab_config = Some(ab_config(&["a", "b", "c"]));
        assert!(CampaignManager::validate_create(&input, now()).is_ok());

        input.ab_config = Some(ab_config(&["a", "b", "c", "d"]));
        assert!(CampaignManager::validate_create(&input, now()).is_err());
    }

    #[test]
    fn test_ab_test_rejects_duplicate_variation_ids() {
        let mut input = base_input(CampaignKind::AbTest);
        input.ab_config = Some(ab_config(&["a", "a"]));
        assert!(CampaignManager::validate_create(&input, now()).is_err());
    }

    #[test]
    fn test_ab_test_rejects_empty_variation_content() {
        let mut input = base_input(CampaignKind::AbTest);
        let mut config = ab_config(&["a", "b"]);
        config.variations[1].subject = "  ".to_string();
        input.ab_config = Some(config);
        assert!(CampaignManager::validate_create(&input, now()).is_err());
    }

    #[test]
    fn test_inactive_campaigns_are_not_started() {
        assert!(CampaignManager::should_start(&stored_campaign("pending", "active")).unwrap());
        assert!(CampaignManager::should_start(&stored_campaign("scheduled", "active")).unwrap());

        // Deactivation parks the campaign until it is reactivated
        assert!(!CampaignManager::should_start(&stored_campaign("pending", "inactive")).unwrap());
        assert!(
            !CampaignManager::should_start(&stored_campaign("scheduled", "inactive")).unwrap()
        );
    }

    #[test]
    fn test_started_and_finished_campaigns_are_not_restarted() {
        assert!(!CampaignManager::should_start(&stored_campaign("sending", "active")).unwrap());
        assert!(!CampaignManager::should_start(&stored_campaign("done", "active")).unwrap());
        assert!(!CampaignManager::should_start(&stored_campaign("failed", "active")).unwrap());
    }

    #[test]
    fn test_malformed_from_address_rejected() {
        let mut input = base_input(CampaignKind::Immediate);
        input.from_address = "not-an-address".to_string();
        assert!(matches!(
            CampaignManager::validate_create(&input, now()),
            Err(CampaignError::Validation(_))
        ));
    }

    #[test]
    fn test_empty_name_rejected() {
        let mut input = base_input(CampaignKind::Immediate);
        input.name = "".to_string();
        assert!(CampaignManager::validate_create(&input, now()).is_err());
    }

    #[test]
    fn test_empty_body_rejected_for_non_ab() {
        let mut input = base_input(CampaignKind::Immediate);
        input.html_body = "".to_string();
        assert!(CampaignManager::validate_create(&input, now()).is_err());
    }
}
