//! Mailwave API - Authenticated campaign management surface
//!
//! Serves the owner-facing REST API: campaign CRUD, the A/B evaluation
//! trigger, and the event/analytics read endpoint. Everything except
//! `/health` requires an API key.

pub mod auth;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use mailwave_core::{AbTestOrchestrator, CampaignManager};
use mailwave_storage::db::DatabasePool;
use mailwave_storage::repository::{ApiKeyRepositoryTrait, CampaignRepository, EventRepository};

pub use routes::create_router;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub campaign_repo: CampaignRepository,
    pub event_repo: EventRepository,
    pub manager: Arc<CampaignManager>,
    pub orchestrator: Arc<AbTestOrchestrator>,
    pub api_keys: Arc<dyn ApiKeyRepositoryTrait>,
}

impl AppState {
    pub fn new(
        db_pool: DatabasePool,
        manager: Arc<CampaignManager>,
        orchestrator: Arc<AbTestOrchestrator>,
        api_keys: Arc<dyn ApiKeyRepositoryTrait>,
    ) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            event_repo: EventRepository::new(pool),
            manager,
            orchestrator,
            api_keys,
        }
    }
}
