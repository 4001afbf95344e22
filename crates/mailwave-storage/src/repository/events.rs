//! Tracking event repository. Events are append-only.

use chrono::{DateTime, Utc};
use mailwave_common::types::CampaignId;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{NewEvent, TrackingEvent};

/// Tracking event repository
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    /// Create a new event repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Append an event to the campaign's stream
    pub async fn append(&self, event: NewEvent) -> Result<TrackingEvent, sqlx::Error> {
        let id = Uuid::new_v4();

        sqlx::query_as::<_, TrackingEvent>(
            r#"
            INSERT INTO events (
                campaign_id, id, recipient_id, email, event_type, variation_id,
                occurred_at, user_agent, ip_address, country, metadata
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(event.campaign_id)
        .bind(id)
        .bind(event.recipient_id)
        .bind(&event.email)
        .bind(event.event_type.to_string())
        .bind(&event.variation_id)
        .bind(event.occurred_at)
        .bind(&event.user_agent)
        .bind(&event.ip_address)
        .bind(&event.country)
        .bind(&event.metadata)
        .fetch_one(&self.pool)
        .await
    }

    /// List events for a campaign within a time window, ordered by
    /// occurrence. An optional variation filter scopes A/B analytics.
    pub async fn list_range(
        &self,
        campaign_id: CampaignId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        variation_id: Option<&str>,
        limit: i64,
    ) -> Result<Vec<TrackingEvent>, sqlx::Error> {
        if let Some(variation_id) = variation_id {
            sqlx::query_as::<_, TrackingEvent>(
                r#"
                SELECT * FROM events
                WHERE campaign_id = $1
                  AND occurred_at >= $2
                  AND occurred_at <= $3
                  AND variation_id = $4
                ORDER BY occurred_at ASC
                LIMIT $5
                "#,
            )
            .bind(campaign_id)
            .bind(from)
            .bind(to)
            .bind(variation_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, TrackingEvent>(
                r#"
                SELECT * FROM events
                WHERE campaign_id = $1
                  AND occurred_at >= $2
                  AND occurred_at <= $3
                ORDER BY occurred_at ASC
                LIMIT $4
                "#,
            )
            .bind(campaign_id)
            .bind(from)
            .bind(to)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// List the full event stream for a campaign
    pub async fn list_all(
        &self,
        campaign_id: CampaignId,
    ) -> Result<Vec<TrackingEvent>, sqlx::Error> {
        sqlx::query_as::<_, TrackingEvent>(
            "SELECT * FROM events WHERE campaign_id = $1 ORDER BY occurred_at ASC",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
    }
}
