//! Mailwave - Campaign server entry point

use anyhow::Result;
use mailwave_common::config::Config;
use mailwave_common::SystemClock;
use mailwave_core::{
    AbTestOrchestrator, CampaignManager, CampaignScheduler, DeliveryDispatcher, SmtpSender,
};
use mailwave_storage::db::DatabasePool;
use mailwave_storage::repository::{ApiKeyRepository, DbSegmentDirectory};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Mailwave campaign server...");

    let config = Config::load()?;

    let db_pool = DatabasePool::new(&config.database).await?;
    db_pool.migrate().await?;

    let clock = Arc::new(SystemClock);

    // Campaign manager and scheduler
    let segments = Arc::new(DbSegmentDirectory::new(db_pool.pool().clone()));
    let manager = Arc::new(CampaignManager::new(
        db_pool.clone(),
        segments,
        config.delivery.max_attempts,
    ));

    let scheduler_handle = {
        let scheduler =
            CampaignScheduler::new(manager.clone(), config.delivery.scheduler_tick_secs);
        tokio::spawn(async move {
            scheduler.run().await;
        })
    };

    // Delivery dispatcher
    let dispatcher_handle = {
        let transport = Arc::new(SmtpSender::new(config.smtp.clone()));
        let dispatcher = DeliveryDispatcher::new(
            db_pool.clone(),
            transport,
            clock.clone(),
            config.delivery.clone(),
            config.tracking.clone(),
        );
        tokio::spawn(async move {
            dispatcher.run().await;
        })
    };

    // A/B test orchestrator
    let orchestrator = Arc::new(AbTestOrchestrator::new(db_pool.clone(), clock.clone()));
    let orchestrator_handle = {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            orchestrator.run().await;
        })
    };

    // Authenticated API server
    let api_handle = {
        let api_keys = Arc::new(ApiKeyRepository::new(db_pool.clone()));
        let state =
            mailwave_api::AppState::new(db_pool.clone(), manager.clone(), orchestrator, api_keys);
        let bind = format!("{}:{}", config.server.bind_address, config.api.port);

        tokio::spawn(async move {
            let app = mailwave_api::create_router(state);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .expect("Failed to bind API server");
            info!("Starting API server on {}", bind);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("API server error: {}", e);
            }
        })
    };

    // Public tracking server
    let tracking_handle = {
        let state = mailwave_tracking::TrackingState::new(
            db_pool.clone(),
            clock.clone(),
            config.tracking.clone(),
        );
        let bind = format!("{}:{}", config.server.bind_address, config.tracking.port);

        tokio::spawn(async move {
            let app = mailwave_tracking::create_router(state);
            let listener = tokio::net::TcpListener::bind(&bind)
                .await
                .expect("Failed to bind tracking server");
            info!("Starting tracking server on {}", bind);
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Tracking server error: {}", e);
            }
        })
    };

    info!("Mailwave server started successfully");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    scheduler_handle.abort();
    dispatcher_handle.abort();
    orchestrator_handle.abort();
    api_handle.abort();
    tracking_handle.abort();

    info!("Mailwave server shutdown complete");

    Ok(())
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,mailwave=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_level(true))
        .with(filter)
        .init();
}
