//! Unsubscribe suppression list

use mailwave_common::types::{CampaignId, ContactId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::Unsubscribe;

/// Unsubscribe repository
#[derive(Clone)]
pub struct UnsubscribeRepository {
    pool: PgPool,
}

impl UnsubscribeRepository {
    /// Create a new unsubscribe repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record an unsubscribe
    pub async fn insert(
        &self,
        campaign_id: Option<CampaignId>,
        email: &str,
        recipient_id: Option<ContactId>,
        source: &str,
    ) -> Result<Unsubscribe, sqlx::Error> {
        sqlx::query_as::<_, Unsubscribe>(
            r#"
            INSERT INTO unsubscribes (id, campaign_id, email, recipient_id, source)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(campaign_id)
        .bind(email)
        .bind(recipient_id)
        .bind(source)
        .fetch_one(&self.pool)
        .await
    }

    /// Of the given addresses, which are on the suppression list
    pub async fn suppressed_among(&self, emails: &[String]) -> Result<Vec<String>, sqlx::Error> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT email FROM unsubscribes WHERE email = ANY($1)",
        )
        .bind(emails)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}
