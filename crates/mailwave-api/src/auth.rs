//! Authentication module

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use mailwave_common::types::OwnerId;
use mailwave_storage::repository::ApiKey;
use sha2::{Digest, Sha256};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::AppState;

/// Authenticated context extracted from API key
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// The owner this API key belongs to
    pub owner_id: OwnerId,
    /// API key ID for audit logging
    pub api_key_id: Uuid,
}

/// Extract API key from request
pub fn extract_api_key(req: &Request) -> Option<&str> {
    // Check Authorization header
    if let Some(auth) = req.headers().get("authorization") {
        if let Ok(auth_str) = auth.to_str() {
            if let Some(key) = auth_str.strip_prefix("Bearer ") {
                return Some(key);
            }
        }
    }

    // Check X-API-Key header
    if let Some(key) = req.headers().get("x-api-key") {
        if let Ok(key_str) = key.to_str() {
            return Some(key_str);
        }
    }

    None
}

/// Extract the prefix from an API key (first 8 characters)
fn extract_key_prefix(api_key: &str) -> Option<&str> {
    if api_key.len() >= 8 {
        Some(&api_key[..8])
    } else {
        None
    }
}

/// Hash an API key for comparison
fn hash_api_key(api_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(api_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Verify an API key against a stored SHA-256 hex hash
fn verify_api_key(api_key: &str, stored_hash: &str) -> bool {
    hash_api_key(api_key) == stored_hash
}

/// Validate an API key against the database
async fn validate_api_key(state: &AppState, api_key: &str) -> Result<ApiKey, StatusCode> {
    let prefix = extract_key_prefix(api_key).ok_or_else(|| {
        warn!("API key too short");
        StatusCode::UNAUTHORIZED
    })?;

    // Find potential matches by prefix
    let candidates = state.api_keys.find_by_prefix(prefix).await.map_err(|e| {
        error!("Database error while looking up API key: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    if candidates.is_empty() {
        warn!("No API key found with prefix: {}", prefix);
        return Err(StatusCode::UNAUTHORIZED);
    }

    for candidate in candidates {
        if verify_api_key(api_key, &candidate.key_hash) {
            // Update last_used_at (fire and forget, don't fail auth on this)
            let repo = state.api_keys.clone();
            let key_id = candidate.id;
            tokio::spawn(async move {
                if let Err(e) = repo.update_last_used(key_id).await {
                    error!("Failed to update API key last_used_at: {}", e);
                }
            });

            debug!(
                "API key {} authenticated for owner {}",
                candidate.id, candidate.owner_id
            );
            return Ok(candidate);
        }
    }

    warn!("API key hash mismatch for prefix: {}", prefix);
    Err(StatusCode::UNAUTHORIZED)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Skip auth for health check endpoints
    if request.uri().path().starts_with("/health") {
        return Ok(next.run(request).await);
    }

    let api_key = extract_api_key(&request).ok_or_else(|| {
        warn!("Missing API key in request to {}", request.uri().path());
        StatusCode::UNAUTHORIZED
    })?;

    let validated_key = validate_api_key(&state, api_key).await?;

    let auth_context = AuthContext {
        owner_id: validated_key.owner_id,
        api_key_id: validated_key.id,
    };

    request.extensions_mut().insert(auth_context);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::{extract_key_prefix, verify_api_key};
    use sha2::{Digest, Sha256};

    #[test]
    fn verifies_sha256_hash() {
        let api_key = "mw_test_key_12345";
        let mut hasher = Sha256::new();
        hasher.update(api_key.as_bytes());
        let hash = hex::encode(hasher.finalize());

        assert!(verify_api_key(api_key, &hash));
        assert!(!verify_api_key("wrong_key", &hash));
    }

    #[test]
    fn rejects_short_keys() {
        assert_eq!(extract_key_prefix("short"), None);
        assert_eq!(extract_key_prefix("mw_test_key"), Some("mw_test_"));
    }
}
