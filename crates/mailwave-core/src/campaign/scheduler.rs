//! Campaign scheduler.
//!
//! Periodically picks up scheduled campaigns whose send time has arrived
//! and pending immediate campaigns, and hands them to the manager to
//! start. Startup races between concurrent ticks are resolved inside the
//! manager's state claim.

use std::sync::Arc;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};

use super::manager::CampaignManager;

/// Campaign scheduler worker
pub struct CampaignScheduler {
    manager: Arc<CampaignManager>,
    tick_secs: u64,
}

impl CampaignScheduler {
    pub fn new(manager: Arc<CampaignManager>, tick_secs: u64) -> Self {
        Self { manager, tick_secs }
    }

    /// Run the scheduler loop
    pub async fn run(&self) {
        let mut ticker = interval(Duration::from_secs(self.tick_secs));

        info!("Campaign scheduler started (interval: {}s)", self.tick_secs);

        loop {
            ticker.tick().await;

            if let Err(e) = self.tick().await {
                error!("Scheduler tick error: {}", e);
            }
        }
    }

    /// Start everything that is due
    async fn tick(&self) -> anyhow::Result<()> {
        let mut due = self.manager.get_scheduled_ready().await?;
        due.extend(self.manager.get_pending().await?);

        if due.is_empty() {
            return Ok(());
        }

        debug!("{} campaigns due to start", due.len());

        for campaign in &due {
            if let Err(e) = self.manager.start(campaign).await {
                // One broken campaign must not block the rest
                error!("Failed to start campaign {}: {}", campaign.id, e);
            }
        }

        Ok(())
    }
}
