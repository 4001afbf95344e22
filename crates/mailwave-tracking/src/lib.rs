//! Mailwave Tracking - Public engagement endpoints
//!
//! Serves the unauthenticated surface embedded into outgoing emails:
//! the open-tracking pixel redirect, the pixel renderer that records
//! opens, click redirects, and one-click unsubscribe. These endpoints
//! are hit by mail clients and proxies, so every handler is infallible:
//! recording errors are logged and the pixel or redirect is served
//! regardless.

pub mod handlers;
pub mod routes;

use std::sync::Arc;

use mailwave_common::config::TrackingConfig;
use mailwave_common::Clock;
use mailwave_storage::db::DatabasePool;
use mailwave_storage::repository::{
    EventRepository, LinkMappingRepository, RecipientRepository, UnsubscribeRepository,
};

pub use routes::create_router;

/// Shared tracking state
#[derive(Clone)]
pub struct TrackingState {
    pub event_repo: EventRepository,
    pub link_repo: LinkMappingRepository,
    pub recipient_repo: RecipientRepository,
    pub unsubscribe_repo: UnsubscribeRepository,
    pub clock: Arc<dyn Clock>,
    pub config: TrackingConfig,
}

impl TrackingState {
    pub fn new(db_pool: DatabasePool, clock: Arc<dyn Clock>, config: TrackingConfig) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            event_repo: EventRepository::new(pool.clone()),
            link_repo: LinkMappingRepository::new(pool.clone()),
            recipient_repo: RecipientRepository::new(pool.clone()),
            unsubscribe_repo: UnsubscribeRepository::new(pool),
            clock,
            config,
        }
    }
}
