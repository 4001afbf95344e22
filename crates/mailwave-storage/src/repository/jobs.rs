//! Durable send job queue.
//!
//! Jobs are claimed with an exclusive lease via `FOR UPDATE SKIP LOCKED`,
//! so multiple dispatcher workers never double-claim. A lease that is not
//! acked before it expires is reclaimed on a later tick, which gives the
//! queue its at-least-once guarantee.

use chrono::Duration;
use mailwave_common::types::{CampaignId, SendJobId};
use sqlx::PgPool;

use crate::models::SendJob;

/// Send job repository
#[derive(Clone)]
pub struct SendJobRepository {
    pool: PgPool,
}

impl SendJobRepository {
    /// Create a new send job repository
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Claim up to `limit` due jobs under an exclusive lease. The claim
    /// also counts as an attempt.
    pub async fn claim_batch(
        &self,
        limit: i64,
        lease_secs: i64,
    ) -> Result<Vec<SendJob>, sqlx::Error> {
        sqlx::query_as::<_, SendJob>(
            r#"
            UPDATE send_jobs SET
                status = 'leased',
                attempts = attempts + 1,
                lease_expires_at = NOW() + make_interval(secs => $2::double precision)
            WHERE id IN (
                SELECT id FROM send_jobs
                WHERE status = 'pending' AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC
                LIMIT $1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(limit)
        .bind(lease_secs)
        .fetch_all(&self.pool)
        .await
    }

    /// Return expired leases to the pending pool
    pub async fn reclaim_expired(&self) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE send_jobs SET status = 'pending', lease_expires_at = NULL
            WHERE status = 'leased' AND lease_expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Acknowledge a completed job
    pub async fn ack(&self, id: SendJobId) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE send_jobs SET status = 'done', lease_expires_at = NULL WHERE id = $1",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Reschedule a job after a transient failure
    pub async fn retry(
        &self,
        id: SendJobId,
        delay: Duration,
        error: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE send_jobs SET
                status = 'pending',
                lease_expires_at = NULL,
                last_error = $3,
                scheduled_at = NOW() + make_interval(secs => $2::double precision)
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(delay.num_seconds() as f64)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Abandon a job permanently
    pub async fn fail(&self, id: SendJobId, error: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE send_jobs SET status = 'failed', lease_expires_at = NULL, last_error = $2
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Jobs for a campaign that are neither done nor failed. Zero means the
    /// campaign has finished sending.
    pub async fn unresolved_count(&self, campaign_id: CampaignId) -> Result<i64, sqlx::Error> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM send_jobs
            WHERE campaign_id = $1 AND status IN ('pending', 'leased')
            "#,
        )
        .bind(campaign_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(count.0)
    }
}
