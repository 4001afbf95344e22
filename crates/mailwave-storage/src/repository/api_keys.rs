//! API key repository

use crate::db::DatabasePool;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mailwave_common::types::OwnerId;
use mailwave_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// API Key model
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub owner_id: OwnerId,
    pub name: String,
    pub key_prefix: String,
    pub key_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

/// API key repository trait
#[async_trait]
pub trait ApiKeyRepository: Send + Sync {
    /// Find API keys by prefix (for initial lookup)
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>>;

    /// Update last_used_at timestamp
    async fn update_last_used(&self, id: Uuid) -> Result<()>;
}

/// Database API key repository
pub struct DbApiKeyRepository {
    pool: DatabasePool,
}

impl DbApiKeyRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApiKeyRepository for DbApiKeyRepository {
    async fn find_by_prefix(&self, prefix: &str) -> Result<Vec<ApiKey>> {
        sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, owner_id, name, key_prefix, key_hash, created_at, last_used_at
            FROM api_keys
            WHERE key_prefix = $1
            LIMIT 10
            "#,
        )
        .bind(prefix)
        .fetch_all(self.pool.pool())
        .await
        .map_err(|e| Error::Database(e.to_string()))
    }

    async fn update_last_used(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE api_keys SET last_used_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(self.pool.pool())
            .await
            .map_err(|e| Error::Database(e.to_string()))?;
        Ok(())
    }
}
