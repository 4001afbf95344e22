//! A/B test evaluation and winner commit.
//!
//! Scoring is pure so it can be tested without a database; the commit is
//! a guarded update that only the first evaluation wins. Every later
//! evaluation (periodic tick racing an explicit API trigger, or two
//! ticks racing each other) observes zero affected rows and backs off.

use anyhow::Result;
use mailwave_common::Clock;
use mailwave_storage::db::DatabasePool;
use mailwave_storage::models::{Campaign, TrackingEvent, WinnerCriteria};
use mailwave_storage::repository::{CampaignRepository, EventRepository};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::time::{interval, Duration as TokioDuration};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::analytics::classifier::{classify_opens, OpenKind};

/// Computed score for one variation
#[derive(Debug, Clone, Serialize)]
pub struct VariationScore {
    pub variation_id: String,
    pub sent: u64,
    pub unique_human_openers: u64,
    pub unique_clickers: u64,
    pub human_opens: u64,
    pub clicks: u64,
    pub score: f64,
}

/// Score one variation's events against the configured criterion.
/// All rates are per sent message; a variation that sent nothing scores
/// zero rather than dividing by zero.
pub fn score_variation(
    variation_id: &str,
    events: &[TrackingEvent],
    criteria: WinnerCriteria,
) -> VariationScore {
    let open_kinds = classify_opens(events);

    let mut sent = 0u64;
    let mut human_opens = 0u64;
    let mut clicks = 0u64;
    let mut human_openers: HashSet<Uuid> = HashSet::new();
    let mut clickers: HashSet<Uuid> = HashSet::new();

    for event in events {
        match event.event_type.as_str() {
            "sent" => sent += 1,
            "open" => {
                if open_kinds.get(&event.id) == Some(&OpenKind::Human) {
                    human_opens += 1;
                    human_openers.insert(event.recipient_id);
                }
            }
            "click" => {
                clicks += 1;
                clickers.insert(event.recipient_id);
            }
            _ => {}
        }
    }

    let denominator = sent.max(1) as f64;
    let score = if sent == 0 {
        0.0
    } else {
        match criteria {
            WinnerCriteria::OpenRate => human_openers.len() as f64 / denominator,
            WinnerCriteria::ClickRate => clickers.len() as f64 / denominator,
            WinnerCriteria::EngagementRate => (human_opens + 2 * clicks) as f64 / denominator,
        }
    };

    VariationScore {
        variation_id: variation_id.to_string(),
        sent,
        unique_human_openers: human_openers.len() as u64,
        unique_clickers: clickers.len() as u64,
        human_opens,
        clicks,
        score,
    }
}

/// Pick the winner: the strictly highest score, with ties resolved in
/// favor of the lexicographically first variation id.
pub fn select_winner(scores: &[VariationScore]) -> Option<&VariationScore> {
    scores.iter().min_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.variation_id.cmp(&b.variation_id))
    })
}

/// A/B test orchestrator. Periodically evaluates completed tests whose
/// observation window has elapsed; also invoked directly by the API.
pub struct AbTestOrchestrator {
    campaign_repo: CampaignRepository,
    event_repo: EventRepository,
    clock: Arc<dyn Clock>,
    tick_secs: u64,
}

impl AbTestOrchestrator {
    pub fn new(db_pool: DatabasePool, clock: Arc<dyn Clock>) -> Self {
        let pool = db_pool.pool().clone();
        Self {
            campaign_repo: CampaignRepository::new(pool.clone()),
            event_repo: EventRepository::new(pool),
            clock,
            tick_secs: 60,
        }
    }

    pub fn with_tick_secs(mut self, secs: u64) -> Self {
        self.tick_secs = secs;
        self
    }

    /// Run the evaluation loop
    pub async fn run(&self) {
        let mut ticker = interval(TokioDuration::from_secs(self.tick_secs));

        info!("A/B test orchestrator started (interval: {}s)", self.tick_secs);

        loop {
            ticker.tick().await;

            if let Err(e) = self.evaluate_due_tests().await {
                error!("Error evaluating A/B tests: {}", e);
            }
        }
    }

    async fn evaluate_due_tests(&self) -> Result<()> {
        let campaigns = self.campaign_repo.get_ab_tests_awaiting_decision().await?;

        for campaign in campaigns {
            if let Err(e) = self.evaluate(&campaign).await {
                error!("Failed to evaluate A/B test {}: {}", campaign.id, e);
            }
        }

        Ok(())
    }

    /// Evaluate one campaign and commit the winner. Returns the winning
    /// variation id, or `None` when the campaign has no evaluable config
    /// or another evaluation already committed.
    pub async fn evaluate(&self, campaign: &Campaign) -> Result<Option<String>> {
        let config = match campaign.ab_config().ok().flatten() {
            Some(c) if !c.variations.is_empty() => c,
            _ => {
                warn!("Campaign {} has no evaluable A/B config", campaign.id);
                return Ok(None);
            }
        };

        if config.winner_id.is_some() {
            return Ok(None);
        }

        let events = self.event_repo.list_all(campaign.id).await?;

        // Partition once instead of querying per variation
        let mut by_variation: HashMap<&str, Vec<TrackingEvent>> = HashMap::new();
        for event in &events {
            if let Some(v) = event.variation_id.as_deref() {
                by_variation.entry(v).or_default().push(event.clone());
            }
        }

        let scores: Vec<VariationScore> = config
            .variations
            .iter()
            .map(|v| {
                let events = by_variation.get(v.id.as_str()).map_or(&[][..], |e| &e[..]);
                score_variation(&v.id, events, config.winner_criteria)
            })
            .collect();

        let winner = match select_winner(&scores) {
            Some(w) => w.variation_id.clone(),
            None => return Ok(None),
        };

        let committed = self
            .campaign_repo
            .commit_ab_winner(campaign.id, &winner, self.clock.now())
            .await?;

        if committed {
            info!(
                "A/B test {} decided: winner {} ({:?})",
                campaign.id, winner, config.winner_criteria
            );
            Ok(Some(winner))
        } else {
            info!(
                "A/B test {} already decided elsewhere, skipping commit",
                campaign.id
            );
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn events_for(
        variation: &str,
        sent: usize,
        human_openers: usize,
        clickers: usize,
    ) -> Vec<TrackingEvent> {
        let campaign = Uuid::new_v4();
        let base = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();
        let mut events = Vec::new();

        for i in 0..sent {
            let recipient = Uuid::new_v4();
            let mk = |event_type: &str, offset_mins: i64| TrackingEvent {
                campaign_id: campaign,
                id: Uuid::new_v4(),
                recipient_id: recipient,
                email: None,
                event_type: event_type.to_string(),
                variation_id: Some(variation.to_string()),
                occurred_at: base + chrono::Duration::minutes(offset_mins),
                user_agent: None,
                ip_address: None,
                country: None,
                metadata: serde_json::json!({}),
            };

            events.push(mk("sent", 0));
            if i < human_openers {
                // proxy prefetch then human open
                events.push(mk("open", 1));
                events.push(mk("open", 60));
            }
            if i < clickers {
                events.push(mk("click", 65));
            }
        }
        events
    }

    #[test]
    fn test_click_rate_winner() {
        // A: 10 clickers / 100 sent, B: 15 / 100, C: 12 / 100
        let a = score_variation("a", &events_for("a", 100, 20, 10), WinnerCriteria::ClickRate);
        let b = score_variation("b", &events_for("b", 100, 20, 15), WinnerCriteria::ClickRate);
        let c = score_variation("c", &events_for("c", 100, 20, 12), WinnerCriteria::ClickRate);

        assert_eq!(a.score, 0.10);
        assert_eq!(b.score, 0.15);
        assert_eq!(c.score, 0.12);

        let scores = [a, b, c];
        let winner = select_winner(&scores).unwrap();
        assert_eq!(winner.variation_id, "b");
    }

    #[test]
    fn test_tie_breaks_to_lexicographically_first() {
        let b = score_variation("b", &events_for("b", 50, 10, 5), WinnerCriteria::OpenRate);
        let a = score_variation("a", &events_for("a", 50, 10, 5), WinnerCriteria::OpenRate);

        assert_eq!(a.score, b.score);
        let scores = [b, a];
        let winner = select_winner(&scores).unwrap();
        assert_eq!(winner.variation_id, "a");
    }

    #[test]
    fn test_open_rate_counts_human_openers_only() {
        // 10 sent, 4 human openers; prefetch-only recipients don't count
        let score = score_variation("a", &events_for("a", 10, 4, 0), WinnerCriteria::OpenRate);
        assert_eq!(score.score, 0.4);
        assert_eq!(score.unique_human_openers, 4);
    }

    #[test]
    fn test_engagement_rate_weighs_clicks_double() {
        // 10 sent, 2 human opens, 3 clicks -> (2 + 6) / 10
        let score = score_variation(
            "a",
            &events_for("a", 10, 2, 3),
            WinnerCriteria::EngagementRate,
        );
        assert_eq!(score.score, 0.8);
    }

    #[test]
    fn test_zero_sent_scores_zero() {
        let score = score_variation("a", &[], WinnerCriteria::EngagementRate);
        assert_eq!(score.score, 0.0);
        assert_eq!(score.sent, 0);
    }

    #[test]
    fn test_no_variations_no_winner() {
        assert!(select_winner(&[]).is_none());
    }
}
