//! Recipient repository

use mailwave_common::types::{CampaignId, ContactId};
use sqlx::PgPool;

use crate::models::Recipient;

/// Recipient repository
#[derive(Clone)]
pub struct RecipientRepository {
    pool: PgPool,
}

impl RecipientRepository {
    /// Create a new recipient repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a single recipient
    pub async fn get(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<Option<Recipient>, sqlx::Error> {
        sqlx::query_as::<_, Recipient>(
            "SELECT * FROM recipients WHERE campaign_id = $1 AND contact_id = $2",
        )
        .bind(campaign_id)
        .bind(contact_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// Mark a recipient as successfully delivered
    pub async fn mark_sent(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE recipients SET delivery_status = 'sent'
            WHERE campaign_id = $1 AND contact_id = $2
            "#,
        )
        .bind(campaign_id)
        .bind(contact_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Mark a recipient as permanently failed
    pub async fn mark_failed(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE recipients SET delivery_status = 'failed'
            WHERE campaign_id = $1 AND contact_id = $2
            "#,
        )
        .bind(campaign_id)
        .bind(contact_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Bump the engagement timestamp used for freshness display
    pub async fn touch_last_event(
        &self,
        campaign_id: CampaignId,
        contact_id: ContactId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE recipients SET last_event_at = NOW()
            WHERE campaign_id = $1 AND contact_id = $2
            "#,
        )
        .bind(campaign_id)
        .bind(contact_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
