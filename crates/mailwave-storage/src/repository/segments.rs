//! Audience segment lookup.
//!
//! Segment membership is owned by an external contacts system; this side
//! only reads it. The trait seam lets the campaign manager be exercised
//! against an in-memory directory in tests.

use async_trait::async_trait;
use mailwave_common::types::SegmentId;
use mailwave_common::{Error, Result};
use sqlx::PgPool;

use crate::models::SegmentContact;

/// Read-only view of segment membership
#[async_trait]
pub trait SegmentDirectory: Send + Sync {
    /// Subscribed contacts in a segment
    async fn contacts(&self, segment_id: SegmentId) -> Result<Vec<SegmentContact>>;
}

/// Database-backed segment directory
#[derive(Clone)]
pub struct DbSegmentDirectory {
    pool: PgPool,
}

impl DbSegmentDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SegmentDirectory for DbSegmentDirectory {
    async fn contacts(&self, segment_id: SegmentId) -> Result<Vec<SegmentContact>> {
        sqlx::query_as::<_, SegmentContact>(
            r#"
            SELECT * FROM segment_contacts
            WHERE segment_id = $1 AND status = 'subscribed'
            ORDER BY contact_id
            "#,
        )
        .bind(segment_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }
}
