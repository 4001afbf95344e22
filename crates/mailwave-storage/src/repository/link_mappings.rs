//! Click tracking link mappings

use mailwave_common::types::TrackingId;
use sqlx::PgPool;

use crate::models::LinkMapping;

/// Link mapping repository
#[derive(Clone)]
pub struct LinkMappingRepository {
    pool: PgPool,
}

impl LinkMappingRepository {
    /// Create a new link mapping repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Store the mappings generated while rewriting one email's links
    pub async fn insert_batch(&self, mappings: &[LinkMapping]) -> Result<(), sqlx::Error> {
        for mapping in mappings {
            sqlx::query(
                r#"
                INSERT INTO link_mappings (
                    tracking_id, campaign_id, recipient_id, link_id,
                    original_url, variation_id, email
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ON CONFLICT (tracking_id) DO NOTHING
                "#,
            )
            .bind(mapping.tracking_id)
            .bind(mapping.campaign_id)
            .bind(mapping.recipient_id)
            .bind(&mapping.link_id)
            .bind(&mapping.original_url)
            .bind(&mapping.variation_id)
            .bind(&mapping.email)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Resolve a tracking id back to its destination
    pub async fn get(&self, tracking_id: TrackingId) -> Result<Option<LinkMapping>, sqlx::Error> {
        sqlx::query_as::<_, LinkMapping>("SELECT * FROM link_mappings WHERE tracking_id = $1")
            .bind(tracking_id)
            .fetch_optional(&self.pool)
            .await
    }
}
