//! Tracking routes

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::TrackingState;

/// Create the public tracking router
pub fn create_router(state: TrackingState) -> Router {
    Router::new()
        .route(
            "/track/open/:campaign_id/:recipient_id",
            get(handlers::track_open),
        )
        .route(
            "/track/open/:campaign_id/:recipient_id/render.gif",
            get(handlers::render_pixel),
        )
        .route("/track/click/:tracking_id", get(handlers::track_click))
        .route("/unsubscribe/:token", get(handlers::unsubscribe))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
