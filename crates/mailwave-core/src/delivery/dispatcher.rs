//! Delivery dispatcher.
//!
//! Drains the durable send queue: claims leased batches, renders each
//! recipient's instrumented email, sends it through the transport, and
//! records the outcome. Transient failures retry with exponential
//! backoff; exhausted and permanent failures resolve the recipient as
//! failed and the campaign keeps going for everyone else.

use anyhow::Result;
use chrono::Duration;
use mailwave_common::config::{DeliveryConfig, TrackingConfig};
use mailwave_common::types::{CampaignState, EventType};
use mailwave_common::Clock;
use mailwave_storage::db::DatabasePool;
use mailwave_storage::models::{Campaign, NewEvent, Recipient, SendJob};
use mailwave_storage::repository::{
    CampaignRepository, EventRepository, LinkMappingRepository, RecipientRepository,
    SendJobRepository,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{debug, error, info, warn};

use super::content::render_tracked_email;
use super::transport::{DeliveryResult, OutgoingEmail, SendTransport};

/// Delivery dispatcher worker
#[derive(Clone)]
pub struct DeliveryDispatcher {
    campaign_repo: CampaignRepository,
    recipient_repo: RecipientRepository,
    job_repo: SendJobRepository,
    event_repo: EventRepository,
    link_repo: LinkMappingRepository,
    transport: Arc<dyn SendTransport>,
    clock: Arc<dyn Clock>,
    delivery: DeliveryConfig,
    tracking: TrackingConfig,
}

impl DeliveryDispatcher {
    /// Create a new dispatcher
    pub fn new(
        db_pool: DatabasePool,
        transport: Arc<dyn SendTransport>,
        clock: Arc<dyn Clock>,
        delivery: DeliveryConfig,
        tracking: TrackingConfig,
    ) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            recipient_repo: RecipientRepository::new(pool.clone()),
            job_repo: SendJobRepository::new(pool.clone()),
            event_repo: EventRepository::new(pool.clone()),
            link_repo: LinkMappingRepository::new(pool),
            transport,
            clock,
            delivery,
            tracking,
        }
    }

    /// Run the dispatcher loop
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.delivery.tick_secs));
        let semaphore = Arc::new(Semaphore::new(self.delivery.concurrency));

        info!(
            "Delivery dispatcher started (concurrency: {}, batch: {}, interval: {}s)",
            self.delivery.concurrency, self.delivery.batch_size, self.delivery.tick_secs
        );

        loop {
            ticker.tick().await;

            match self.job_repo.reclaim_expired().await {
                Ok(0) => {}
                Ok(n) => warn!("Reclaimed {} expired delivery leases", n),
                Err(e) => error!("Error reclaiming expired leases: {}", e),
            }

            if let Err(e) = self.process_due_jobs(&semaphore).await {
                error!("Error processing send jobs: {}", e);
            }

            if let Err(e) = self.check_campaign_completions().await {
                error!("Error checking campaign completions: {}", e);
            }
        }
    }

    /// Claim and process one batch of due jobs
    async fn process_due_jobs(&self, semaphore: &Arc<Semaphore>) -> Result<()> {
        let jobs = self
            .job_repo
            .claim_batch(self.delivery.batch_size, self.delivery.lease_secs)
            .await?;

        if jobs.is_empty() {
            return Ok(());
        }

        debug!("Claimed {} send jobs", jobs.len());

        let mut handles = Vec::new();
        for job in jobs {
            let permit = semaphore.clone().acquire_owned().await?;
            let dispatcher = self.clone();

            let handle = tokio::spawn(async move {
                if let Err(e) = dispatcher.process_job(&job).await {
                    error!("Job {} processing error: {}", job.id, e);
                }
                drop(permit);
            });

            handles.push(handle);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Task error: {}", e);
            }
        }

        Ok(())
    }

    /// Process a single send job
    async fn process_job(&self, job: &SendJob) -> Result<()> {
        let campaign = match self.campaign_repo.get(job.campaign_id).await? {
            Some(c) => c,
            None => {
                warn!("Job {} references missing campaign, abandoning", job.id);
                self.job_repo.fail(job.id, "campaign not found").await?;
                return Ok(());
            }
        };

        let recipient = match self
            .recipient_repo
            .get(job.campaign_id, job.contact_id)
            .await?
        {
            Some(r) => r,
            None => {
                warn!("Job {} references missing recipient, abandoning", job.id);
                self.job_repo.fail(job.id, "recipient not found").await?;
                return Ok(());
            }
        };

        // A reclaimed lease can re-deliver a job whose recipient already
        // resolved. Duplicates on the wire are accepted; a resolved row
        // is simply acked.
        if recipient.is_resolved() {
            debug!(
                "Recipient {} already {}, acking job {}",
                recipient.contact_id, recipient.delivery_status, job.id
            );
            self.job_repo.ack(job.id).await?;
            return Ok(());
        }

        let email = self.build_email(&campaign, &recipient).await?;
        let result = self.transport.send(&email).await;
        self.handle_result(job, &campaign, &recipient, result).await
    }

    /// Select content (variation-aware) and instrument the HTML
    async fn build_email(&self, campaign: &Campaign, recipient: &Recipient) -> Result<OutgoingEmail> {
        let (subject, html_body) = match (campaign.ab_config()?, recipient.variation_id.as_deref())
        {
            (Some(config), Some(variation_id)) => config
                .variations
                .iter()
                .find(|v| v.id == variation_id)
                .map(|v| (v.subject.clone(), v.html_body.clone()))
                .unwrap_or_else(|| (campaign.subject.clone(), campaign.html_body.clone())),
            _ => (campaign.subject.clone(), campaign.html_body.clone()),
        };

        let rendered = render_tracked_email(
            &html_body,
            &self.tracking.base_url,
            &self.tracking.unsubscribe_secret,
            campaign.id,
            recipient.contact_id,
            recipient.variation_id.as_deref(),
            &recipient.email,
        );

        self.link_repo.insert_batch(&rendered.link_mappings).await?;

        let from = match &campaign.from_name {
            Some(name) => format!("{} <{}>", name, campaign.from_address),
            None => campaign.from_address.clone(),
        };

        Ok(OutgoingEmail {
            from,
            to: recipient.email.clone(),
            subject,
            html_body: rendered.html,
        })
    }

    /// Record the outcome of a delivery attempt
    async fn handle_result(
        &self,
        job: &SendJob,
        campaign: &Campaign,
        recipient: &Recipient,
        result: DeliveryResult,
    ) -> Result<()> {
        match result {
            DeliveryResult::Sent { message_id } => {
                info!(
                    "Sent campaign {} to {} (Message-ID: {})",
                    campaign.id, recipient.email, message_id
                );

                let mut event = NewEvent::new(
                    campaign.id,
                    recipient.contact_id,
                    EventType::Sent,
                    self.clock.now(),
                );
                event.email = Some(recipient.email.clone());
                event.variation_id = recipient.variation_id.clone();
                event.metadata = serde_json::json!({ "message_id": message_id });
                self.event_repo.append(event).await?;

                self.recipient_repo
                    .mark_sent(campaign.id, recipient.contact_id)
                    .await?;
                self.job_repo.ack(job.id).await?;
            }

            DeliveryResult::TemporaryFailure { error } => {
                if job.attempts_exhausted() {
                    warn!(
                        "Job {} exhausted {} attempts, failing recipient {}",
                        job.id, job.attempts, recipient.email
                    );
                    self.resolve_failed(job, campaign, recipient, "delivery_exhausted", &error)
                        .await?;
                } else {
                    let delay = calculate_backoff(job.attempts);
                    warn!(
                        "Job {} temporary failure (attempt {}), retrying in {}m: {}",
                        job.id,
                        job.attempts,
                        delay.num_minutes(),
                        error
                    );
                    self.job_repo.retry(job.id, delay, &error).await?;
                }
            }

            DeliveryResult::PermanentFailure { error } => {
                error!(
                    "Job {} permanent failure for {}: {}",
                    job.id, recipient.email, error
                );
                self.resolve_failed(job, campaign, recipient, "permanent_failure", &error)
                    .await?;
            }

            DeliveryResult::Bounced { reason } => {
                warn!("Job {} bounced for {}: {}", job.id, recipient.email, reason);
                self.resolve_failed(job, campaign, recipient, "hard_bounce", &reason)
                    .await?;
            }
        }

        Ok(())
    }

    /// Resolve a recipient as failed and emit the bounce event
    async fn resolve_failed(
        &self,
        job: &SendJob,
        campaign: &Campaign,
        recipient: &Recipient,
        reason: &str,
        detail: &str,
    ) -> Result<()> {
        self.recipient_repo
            .mark_failed(campaign.id, recipient.contact_id)
            .await?;

        let mut event = NewEvent::new(
            campaign.id,
            recipient.contact_id,
            EventType::Bounce,
            self.clock.now(),
        );
        event.email = Some(recipient.email.clone());
        event.variation_id = recipient.variation_id.clone();
        event.metadata = serde_json::json!({ "reason": reason, "detail": detail });
        self.event_repo.append(event).await?;

        self.job_repo.fail(job.id, detail).await?;
        Ok(())
    }

    /// Move fully drained campaigns from sending to done
    async fn check_campaign_completions(&self) -> Result<()> {
        let campaigns = self.campaign_repo.get_sending().await?;

        for campaign in campaigns {
            let unresolved = self.job_repo.unresolved_count(campaign.id).await?;
            if unresolved == 0 {
                if self
                    .campaign_repo
                    .update_state(campaign.id, CampaignState::Sending, CampaignState::Done)
                    .await?
                    .is_some()
                {
                    info!("Campaign {} completed", campaign.id);
                }
            }
        }

        Ok(())
    }
}

/// Calculate exponential backoff delay
fn calculate_backoff(attempts: i32) -> Duration {
    // Base: 1 minute, max: 4 hours
    let minutes = std::cmp::min(2_i64.pow(attempts.max(0) as u32), 240);
    Duration::minutes(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_backoff() {
        assert_eq!(calculate_backoff(0), Duration::minutes(1));
        assert_eq!(calculate_backoff(1), Duration::minutes(2));
        assert_eq!(calculate_backoff(2), Duration::minutes(4));
        assert_eq!(calculate_backoff(3), Duration::minutes(8));
        assert_eq!(calculate_backoff(10), Duration::minutes(240)); // Max capped at 4 hours
    }

    #[test]
    fn test_calculate_backoff_never_panics_on_negative() {
        assert_eq!(calculate_backoff(-1), Duration::minutes(1));
    }
}
