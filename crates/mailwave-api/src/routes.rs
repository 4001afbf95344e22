//! API routes

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::trace::TraceLayer;

use crate::auth::auth_middleware;
use crate::handlers::{campaigns, events, health};
use crate::AppState;

/// Create the API router
pub fn create_router(state: AppState) -> Router {
    // Health check routes (no auth required)
    let health_routes = Router::new()
        .route("/", get(health::health))
        .route("/ready", get(health::readiness))
        .with_state(state.clone());

    // Campaign routes
    let campaign_routes = Router::new()
        .route("/", get(campaigns::list_campaigns))
        .route("/", post(campaigns::create_campaign))
        .route("/:campaign_id", get(campaigns::get_campaign))
        .route("/:campaign_id", put(campaigns::update_campaign))
        .route("/:campaign_id", delete(campaigns::delete_campaign))
        .route("/:campaign_id/ab/evaluate", post(campaigns::evaluate_ab_test))
        .route("/:campaign_id/events", get(events::get_events));

    // API v1 routes with authentication
    let api_v1 = Router::new()
        .nest("/campaigns", campaign_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .nest("/health", health_routes)
        .nest("/api/v1", api_v1)
        .layer(TraceLayer::new_for_http())
}
