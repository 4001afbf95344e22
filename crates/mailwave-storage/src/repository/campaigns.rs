//! Campaign repository

use chrono::{DateTime, Utc};
use mailwave_common::types::{CampaignState, OwnerId};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Campaign, CreateCampaign, NewRecipient, UpdateCampaign};

/// Campaign repository
#[derive(Clone)]
pub struct CampaignRepository {
    pool: PgPool,
}

impl CampaignRepository {
    /// Create a new campaign repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new campaign
    pub async fn create(&self, input: CreateCampaign) -> Result<Campaign, sqlx::Error> {
        let id = Uuid::new_v4();
        let initial_state = match input.scheduled_at {
            Some(_) => "scheduled",
            None => "pending",
        };
        let ab_config = input
            .ab_config
            .as_ref()
            .map(|c| serde_json::to_value(c).unwrap_or_default());

        sqlx::query_as::<_, Campaign>(
            r#"
            INSERT INTO campaigns (
                id, owner_id, name, kind, state, status, subject, html_body,
                from_address, from_name, segment_id, scheduled_at, ab_config
            )
            VALUES ($1, $2, $3, $4, $5, 'active', $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(input.owner_id)
        .bind(&input.name)
        .bind(input.kind.to_string())
        .bind(initial_state)
        .bind(&input.subject)
        .bind(&input.html_body)
        .bind(&input.from_address)
        .bind(&input.from_name)
        .bind(input.segment_id)
        .bind(input.scheduled_at)
        .bind(&ab_config)
        .fetch_one(&self.pool)
        .await
    }

    /// Get a campaign by ID
    pub async fn get(&self, id: Uuid) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Get a campaign by ID and owner
    pub async fn get_by_owner(
        &self,
        owner_id: OwnerId,
        id: Uuid,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// List campaigns for an owner
    pub async fn list_by_owner(
        &self,
        owner_id: OwnerId,
        state: Option<CampaignState>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Campaign>, sqlx::Error> {
        if let Some(state) = state {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE owner_id = $1 AND state = $2
                ORDER BY created_at DESC
                LIMIT $3 OFFSET $4
                "#,
            )
            .bind(owner_id)
            .bind(state.to_string())
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        } else {
            sqlx::query_as::<_, Campaign>(
                r#"
                SELECT * FROM campaigns
                WHERE owner_id = $1
                ORDER BY created_at DESC
                LIMIT $2 OFFSET $3
                "#,
            )
            .bind(owner_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
        }
    }

    /// Update an editable campaign. Content and schedule changes are only
    /// applied while the campaign has not started sending; the activation
    /// status may be flipped at any time.
    pub async fn update(
        &self,
        id: Uuid,
        owner_id: OwnerId,
        input: UpdateCampaign,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let current = match self.get_by_owner(owner_id, id).await? {
            Some(c) => c,
            None => return Ok(None),
        };

        if !current.is_editable() {
            // Only the activation flag may still change
            if let Some(status) = input.status {
                return sqlx::query_as::<_, Campaign>(
                    r#"
                    UPDATE campaigns SET status = $3, updated_at = NOW()
                    WHERE id = $1 AND owner_id = $2
                    RETURNING *
                    "#,
                )
                .bind(id)
                .bind(owner_id)
                .bind(status.to_string())
                .fetch_optional(&self.pool)
                .await;
            }
            return Ok(Some(current));
        }

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                name = COALESCE($3, name),
                subject = COALESCE($4, subject),
                html_body = COALESCE($5, html_body),
                from_address = COALESCE($6, from_address),
                from_name = COALESCE($7, from_name),
                scheduled_at = COALESCE($8, scheduled_at),
                status = COALESCE($9, status),
                updated_at = NOW()
            WHERE id = $1 AND owner_id = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(owner_id)
        .bind(&input.name)
        .bind(&input.subject)
        .bind(&input.html_body)
        .bind(&input.from_address)
        .bind(&input.from_name)
        .bind(input.scheduled_at)
        .bind(input.status.map(|s| s.to_string()))
        .fetch_optional(&self.pool)
        .await
    }

    /// Transition a campaign between execution states. The `from` guard
    /// makes concurrent transitions race-safe: only one caller observes
    /// a row change.
    pub async fn update_state(
        &self,
        id: Uuid,
        from: CampaignState,
        to: CampaignState,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let started_at = if to == CampaignState::Sending {
            Some(Utc::now())
        } else {
            None
        };

        let completed_at = if to.is_terminal() { Some(Utc::now()) } else { None };

        sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                state = $3,
                started_at = COALESCE($4, started_at),
                completed_at = COALESCE($5, completed_at),
                updated_at = NOW()
            WHERE id = $1 AND state = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.to_string())
        .bind(to.to_string())
        .bind(started_at)
        .bind(completed_at)
        .fetch_optional(&self.pool)
        .await
    }

    /// Claim the sending state and materialize the recipient and send job
    /// rows in a single transaction. Returns the claimed campaign, or
    /// `None` when another caller won the state transition. A failure
    /// before commit rolls everything back, so a sending campaign always
    /// has its jobs: there is no window where a crash leaves partial rows.
    pub async fn start_sending(
        &self,
        id: Uuid,
        from: CampaignState,
        recipients: &[NewRecipient],
        max_attempts: i32,
    ) -> Result<Option<Campaign>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let claimed = sqlx::query_as::<_, Campaign>(
            r#"
            UPDATE campaigns SET
                state = 'sending',
                started_at = NOW(),
                total_recipients = $3,
                updated_at = NOW()
            WHERE id = $1 AND state = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(from.to_string())
        .bind(recipients.len() as i32)
        .fetch_optional(&mut *tx)
        .await?;

        if claimed.is_none() {
            // Lost the race; dropping the transaction rolls it back
            return Ok(None);
        }

        for chunk in recipients.chunks(500) {
            let contact_ids: Vec<Uuid> = chunk.iter().map(|r| r.contact_id).collect();
            let emails: Vec<String> = chunk.iter().map(|r| r.email.clone()).collect();
            let variations: Vec<Option<String>> =
                chunk.iter().map(|r| r.variation_id.clone()).collect();
            let job_ids: Vec<Uuid> = chunk.iter().map(|_| Uuid::new_v4()).collect();

            sqlx::query(
                r#"
                INSERT INTO recipients (campaign_id, contact_id, email, variation_id)
                SELECT $1, c, e, v
                FROM UNNEST($2::uuid[], $3::text[], $4::text[]) AS t(c, e, v)
                ON CONFLICT (campaign_id, contact_id) DO NOTHING
                "#,
            )
            .bind(id)
            .bind(&contact_ids)
            .bind(&emails)
            .bind(&variations)
            .execute(&mut *tx)
            .await?;

            sqlx::query(
                r#"
                INSERT INTO send_jobs (id, campaign_id, contact_id, max_attempts)
                SELECT j, $1, c, $4
                FROM UNNEST($2::uuid[], $3::uuid[]) AS t(j, c)
                "#,
            )
            .bind(id)
            .bind(&job_ids)
            .bind(&contact_ids)
            .bind(max_attempts)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(claimed)
    }

    /// Delete a campaign. Refused while it is actively sending.
    pub async fn delete(&self, id: Uuid, owner_id: OwnerId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "DELETE FROM campaigns WHERE id = $1 AND owner_id = $2 AND state != 'sending'",
        )
        .bind(id)
        .bind(owner_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Get active scheduled campaigns whose send time has passed
    pub async fn get_scheduled_ready(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE state = 'scheduled'
              AND status = 'active'
              AND scheduled_at IS NOT NULL
              AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Get active pending immediate campaigns awaiting materialization
    pub async fn get_pending(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE state = 'pending'
              AND status = 'active'
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Get campaigns currently in the sending state
    pub async fn get_sending(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE state = 'sending'")
            .fetch_all(&self.pool)
            .await
    }

    /// Get completed A/B test campaigns whose observation window has
    /// elapsed and no winner has been committed yet
    pub async fn get_ab_tests_awaiting_decision(&self) -> Result<Vec<Campaign>, sqlx::Error> {
        sqlx::query_as::<_, Campaign>(
            r#"
            SELECT * FROM campaigns
            WHERE kind = 'ab_test'
              AND state = 'done'
              AND ab_config IS NOT NULL
              AND ab_config->>'winner_id' IS NULL
              AND completed_at IS NOT NULL
              AND completed_at
                  + make_interval(hours => COALESCE((ab_config->>'test_duration_hours')::int, 24))
                  <= NOW()
            "#,
        )
        .fetch_all(&self.pool)
        .await
    }

    /// Commit the A/B winner once. Returns false when another evaluation
    /// already committed; the caller must treat that as a no-op.
    pub async fn commit_ab_winner(
        &self,
        id: Uuid,
        winner_id: &str,
        selected_at: DateTime<Utc>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE campaigns SET
                ab_config = jsonb_set(
                    jsonb_set(ab_config, '{winner_id}', to_jsonb($2::text)),
                    '{winner_selected_at}', to_jsonb($3::timestamptz)
                ),
                updated_at = NOW()
            WHERE id = $1
              AND ab_config IS NOT NULL
              AND ab_config->>'winner_id' IS NULL
            "#,
        )
        .bind(id)
        .bind(winner_id)
        .bind(selected_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
