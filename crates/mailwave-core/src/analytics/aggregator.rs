//! Campaign analytics aggregation.
//!
//! Consumes the raw event stream for one campaign (optionally pre-filtered
//! to a window or a variation) and derives the full analytics payload.
//! Proxy opens are excluded from every engagement number and reported
//! separately; they only confirm deliverability. A malformed field
//! excludes an event from the one distribution it breaks, never from the
//! whole aggregation.

use chrono::{Duration, Timelike};
use mailwave_storage::models::TrackingEvent;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use uuid::Uuid;

use super::classifier::{classify_opens, OpenKind};
use super::user_agent::parse_user_agent;

/// Everything derived from a campaign's event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignAnalytics {
    pub summary: EventSummary,
    pub distributions: Distributions,
    pub temporal: TemporalAnalytics,
    pub engagement: EngagementMetrics,
    pub recipients: RecipientInsights,
    pub response_times: ResponseTimes,
}

/// Event counts and their percentage breakdown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    pub total_events: u64,
    pub counts: BTreeMap<String, u64>,
    /// Percentage of total per event type; sums to 100 up to rounding
    pub breakdown: BTreeMap<String, f64>,
}

/// One bucket of a categorical distribution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisBucket {
    pub name: String,
    pub count: u64,
    pub percentage: f64,
}

/// OS / device / browser / country distributions for one event type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AxisSet {
    pub os: Vec<AxisBucket>,
    pub device: Vec<AxisBucket>,
    pub browser: Vec<AxisBucket>,
    pub country: Vec<AxisBucket>,
}

/// Distributions computed separately for opens and clicks
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distributions {
    pub opens: AxisSet,
    pub clicks: AxisSet,
}

/// Activity within one local-time hour of day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour: u32,
    pub sent: u64,
    pub proxy_opens: u64,
    pub human_opens: u64,
    pub clicks: u64,
}

/// Hour-of-day activity and the peak engagement hours
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalAnalytics {
    /// 24 buckets, index = local hour of day
    pub hourly: Vec<HourBucket>,
    /// Hour(s) with the highest human-open count; empty when there are none
    pub peak_hours: Vec<u32>,
}

/// Engagement numbers, human opens only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngagementMetrics {
    pub sent: u64,
    pub proxy_opens: u64,
    pub human_opens: u64,
    pub clicks: u64,
    pub bounces: u64,
    pub unsubscribes: u64,
    pub unique_human_openers: u64,
    pub unique_clickers: u64,
    /// Unique human openers who also clicked, over unique human openers
    pub click_to_open_rate: f64,
    pub bounce_rate: f64,
    /// 0-10 score weighting clicks above opens and penalizing bounces
    pub quality_score: f64,
}

/// Per-recipient engagement scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientScore {
    pub recipient_id: Uuid,
    pub email: Option<String>,
    pub human_opens: u64,
    pub clicks: u64,
    pub score: u64,
    pub tier: String,
}

/// Recipient tiers and leaderboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecipientInsights {
    pub total_recipients: u64,
    pub high: u64,
    pub moderate: u64,
    pub low: u64,
    pub average_score: f64,
    pub top_recipients: Vec<RecipientScore>,
}

/// Mean reaction times in minutes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseTimes {
    /// Mean minutes from delivery to the first human open
    pub sent_to_open_minutes: Option<f64>,
    /// Mean minutes from the first human open to the first click
    pub open_to_click_minutes: Option<f64>,
}

// Score weights: a click is worth three opens, a bounce erases two
const OPEN_WEIGHT: u64 = 1;
const CLICK_WEIGHT: u64 = 3;
const BOUNCE_PENALTY: i64 = 2;
const HIGH_TIER_THRESHOLD: u64 = 5;
const MODERATE_TIER_THRESHOLD: u64 = 2;
const TOP_RECIPIENTS: usize = 10;
const MAX_DISTRIBUTION_BUCKETS: usize = 8;

/// Aggregate the full analytics payload from a campaign's events
pub fn aggregate(events: &[TrackingEvent]) -> CampaignAnalytics {
    let open_kinds = classify_opens(events);

    CampaignAnalytics {
        summary: summarize(events),
        distributions: Distributions {
            opens: axis_set(events, "open"),
            clicks: axis_set(events, "click"),
        },
        temporal: temporal(events, &open_kinds),
        engagement: engagement(events, &open_kinds),
        recipients: recipient_insights(events, &open_kinds),
        response_times: response_times(events, &open_kinds),
    }
}

fn percentage(count: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

fn summarize(events: &[TrackingEvent]) -> EventSummary {
    let mut counts: BTreeMap<String, u64> = BTreeMap::new();
    for event in events {
        *counts.entry(event.event_type.clone()).or_default() += 1;
    }

    let total = events.len() as u64;
    let breakdown = counts
        .iter()
        .map(|(k, v)| (k.clone(), percentage(*v, total)))
        .collect();

    EventSummary {
        total_events: total,
        counts,
        breakdown,
    }
}

/// Fold raw category counts into sorted buckets with an "Other" tail
fn fold_buckets(counts: HashMap<String, u64>) -> Vec<AxisBucket> {
    let total: u64 = counts.values().sum();

    let mut sorted: Vec<(String, u64)> = counts.into_iter().collect();
    sorted.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let mut buckets: Vec<AxisBucket> = Vec::new();
    let mut other = 0u64;
    for (i, (name, count)) in sorted.into_iter().enumerate() {
        if i < MAX_DISTRIBUTION_BUCKETS && name != "Other" {
            buckets.push(AxisBucket {
                name,
                count,
                percentage: percentage(count, total),
            });
        } else {
            other += count;
        }
    }
    if other > 0 {
        buckets.push(AxisBucket {
            name: "Other".to_string(),
            count: other,
            percentage: percentage(other, total),
        });
    }
    buckets
}

fn axis_set(events: &[TrackingEvent], event_type: &str) -> AxisSet {
    let mut os: HashMap<String, u64> = HashMap::new();
    let mut device: HashMap<String, u64> = HashMap::new();
    let mut browser: HashMap<String, u64> = HashMap::new();
    let mut country: HashMap<String, u64> = HashMap::new();

    for event in events.iter().filter(|e| e.event_type == event_type) {
        // An event without a user agent drops out of the agent-derived
        // axes but still counts toward country, and vice versa.
        if let Some(ua) = event.user_agent.as_deref().filter(|s| !s.trim().is_empty()) {
            let info = parse_user_agent(ua);
            *os.entry(info.os).or_default() += 1;
            *device.entry(info.device.to_string()).or_default() += 1;
            *browser.entry(info.browser).or_default() += 1;
        }
        if let Some(c) = event.country.as_deref().filter(|s| !s.trim().is_empty()) {
            *country.entry(c.to_string()).or_default() += 1;
        }
    }

    AxisSet {
        os: fold_buckets(os),
        device: fold_buckets(device),
        browser: fold_buckets(browser),
        country: fold_buckets(country),
    }
}

/// Local hour of day for an event, honoring a per-event timezone offset
fn local_hour(event: &TrackingEvent) -> u32 {
    let offset_minutes = event
        .metadata
        .get("tz_offset_minutes")
        .and_then(|v| v.as_i64())
        .unwrap_or(0);
    (event.occurred_at + Duration::minutes(offset_minutes)).hour()
}

fn temporal(events: &[TrackingEvent], open_kinds: &HashMap<Uuid, OpenKind>) -> TemporalAnalytics {
    let mut hourly: Vec<HourBucket> = (0..24)
        .map(|hour| HourBucket {
            hour,
            sent: 0,
            proxy_opens: 0,
            human_opens: 0,
            clicks: 0,
        })
        .collect();

    for event in events {
        let bucket = &mut hourly[local_hour(event) as usize];
        match event.event_type.as_str() {
            "sent" => bucket.sent += 1,
            "open" => match open_kinds.get(&event.id) {
                Some(OpenKind::Human) => bucket.human_opens += 1,
                _ => bucket.proxy_opens += 1,
            },
            "click" => bucket.clicks += 1,
            _ => {}
        }
    }

    let max_human = hourly.iter().map(|b| b.human_opens).max().unwrap_or(0);
    let peak_hours = if max_human == 0 {
        Vec::new()
    } else {
        hourly
            .iter()
            .filter(|b| b.human_opens == max_human)
            .map(|b| b.hour)
            .collect()
    };

    TemporalAnalytics { hourly, peak_hours }
}

fn engagement(
    events: &[TrackingEvent],
    open_kinds: &HashMap<Uuid, OpenKind>,
) -> EngagementMetrics {
    let mut sent = 0u64;
    let mut proxy_opens = 0u64;
    let mut human_opens = 0u64;
    let mut clicks = 0u64;
    let mut bounces = 0u64;
    let mut unsubscribes = 0u64;

    let mut human_openers: HashSet<Uuid> = HashSet::new();
    let mut clickers: HashSet<Uuid> = HashSet::new();

    for event in events {
        match event.event_type.as_str() {
            "sent" => sent += 1,
            "open" => match open_kinds.get(&event.id) {
                Some(OpenKind::Human) => {
                    human_opens += 1;
                    human_openers.insert(event.recipient_id);
                }
                _ => proxy_opens += 1,
            },
            "click" => {
                clicks += 1;
                clickers.insert(event.recipient_id);
            }
            "bounce" => bounces += 1,
            "unsubscribe" => unsubscribes += 1,
            _ => {}
        }
    }

    let human_openers_who_clicked = human_openers.intersection(&clickers).count() as u64;

    let raw_score = (human_opens * OPEN_WEIGHT + clicks * CLICK_WEIGHT) as i64
        - bounces as i64 * BOUNCE_PENALTY;
    let quality_score =
        (raw_score as f64 / sent.max(1) as f64 * 10.0).clamp(0.0, 10.0);

    EngagementMetrics {
        sent,
        proxy_opens,
        human_opens,
        clicks,
        bounces,
        unsubscribes,
        unique_human_openers: human_openers.len() as u64,
        unique_clickers: clickers.len() as u64,
        click_to_open_rate: percentage(human_openers_who_clicked, human_openers.len() as u64),
        bounce_rate: percentage(bounces, sent),
        quality_score,
    }
}

fn tier_for(score: u64) -> &'static str {
    if score >= HIGH_TIER_THRESHOLD {
        "high"
    } else if score >= MODERATE_TIER_THRESHOLD {
        "moderate"
    } else {
        "low"
    }
}

fn recipient_insights(
    events: &[TrackingEvent],
    open_kinds: &HashMap<Uuid, OpenKind>,
) -> RecipientInsights {
    struct Tally {
        email: Option<String>,
        human_opens: u64,
        clicks: u64,
    }

    let mut tallies: HashMap<Uuid, Tally> = HashMap::new();

    for event in events {
        let tally = tallies.entry(event.recipient_id).or_insert(Tally {
            email: None,
            human_opens: 0,
            clicks: 0,
        });
        if tally.email.is_none() {
            tally.email = event.email.clone();
        }
        match event.event_type.as_str() {
            "open" => {
                if open_kinds.get(&event.id) == Some(&OpenKind::Human) {
                    tally.human_opens += 1;
                }
            }
            "click" => tally.clicks += 1,
            _ => {}
        }
    }

    let mut scores: Vec<RecipientScore> = tallies
        .into_iter()
        .map(|(recipient_id, t)| {
            let score = t.human_opens * OPEN_WEIGHT + t.clicks * CLICK_WEIGHT;
            RecipientScore {
                recipient_id,
                email: t.email,
                human_opens: t.human_opens,
                clicks: t.clicks,
                score,
                tier: tier_for(score).to_string(),
            }
        })
        .collect();

    let total = scores.len() as u64;
    let high = scores.iter().filter(|s| s.tier == "high").count() as u64;
    let moderate = scores.iter().filter(|s| s.tier == "moderate").count() as u64;
    let low = scores.iter().filter(|s| s.tier == "low").count() as u64;
    let average_score = if total == 0 {
        0.0
    } else {
        scores.iter().map(|s| s.score).sum::<u64>() as f64 / total as f64
    };

    scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.recipient_id.cmp(&b.recipient_id)));
    scores.truncate(TOP_RECIPIENTS);

    RecipientInsights {
        total_recipients: total,
        high,
        moderate,
        low,
        average_score,
        top_recipients: scores,
    }
}

fn response_times(
    events: &[TrackingEvent],
    open_kinds: &HashMap<Uuid, OpenKind>,
) -> ResponseTimes {
    struct Firsts {
        sent: Option<chrono::DateTime<chrono::Utc>>,
        human_open: Option<chrono::DateTime<chrono::Utc>>,
        click: Option<chrono::DateTime<chrono::Utc>>,
    }

    fn keep_min(
        slot: &mut Option<chrono::DateTime<chrono::Utc>>,
        at: chrono::DateTime<chrono::Utc>,
    ) {
        if slot.map_or(true, |prev| at < prev) {
            *slot = Some(at);
        }
    }

    let mut firsts: HashMap<Uuid, Firsts> = HashMap::new();
    for event in events {
        let entry = firsts.entry(event.recipient_id).or_insert(Firsts {
            sent: None,
            human_open: None,
            click: None,
        });
        match event.event_type.as_str() {
            "sent" => keep_min(&mut entry.sent, event.occurred_at),
            "open" => {
                if open_kinds.get(&event.id) == Some(&OpenKind::Human) {
                    keep_min(&mut entry.human_open, event.occurred_at);
                }
            }
            "click" => keep_min(&mut entry.click, event.occurred_at),
            _ => {}
        }
    }

    let mut open_deltas: Vec<f64> = Vec::new();
    let mut click_deltas: Vec<f64> = Vec::new();
    for f in firsts.values() {
        if let (Some(sent), Some(open)) = (f.sent, f.human_open) {
            if open >= sent {
                open_deltas.push((open - sent).num_seconds() as f64 / 60.0);
            }
        }
        if let (Some(open), Some(click)) = (f.human_open, f.click) {
            if click >= open {
                click_deltas.push((click - open).num_seconds() as f64 / 60.0);
            }
        }
    }

    fn mean(v: &[f64]) -> Option<f64> {
        if v.is_empty() {
            None
        } else {
            Some(v.iter().sum::<f64>() / v.len() as f64)
        }
    }

    ResponseTimes {
        sent_to_open_minutes: mean(&open_deltas),
        open_to_click_minutes: mean(&click_deltas),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn event(
        campaign: Uuid,
        recipient: Uuid,
        event_type: &str,
        at: chrono::DateTime<Utc>,
    ) -> TrackingEvent {
        TrackingEvent {
            campaign_id: campaign,
            id: Uuid::new_v4(),
            recipient_id: recipient,
            email: None,
            event_type: event_type.to_string(),
            variation_id: None,
            occurred_at: at,
            user_agent: None,
            ip_address: None,
            country: None,
            metadata: serde_json::json!({}),
        }
    }

    fn t0() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap()
    }

    #[test]
    fn test_breakdown_percentages_sum_to_100() {
        let campaign = Uuid::new_v4();
        let r = Uuid::new_v4();
        let mut events = Vec::new();
        for _ in 0..3 {
            events.push(event(campaign, r, "sent", t0()));
        }
        for _ in 0..2 {
            events.push(event(campaign, r, "open", t0()));
        }
        events.push(event(campaign, r, "click", t0()));
        events.push(event(campaign, r, "bounce", t0()));

        let summary = summarize(&events);
        let sum: f64 = summary.breakdown.values().sum();
        assert!((sum - 100.0).abs() < 0.1, "breakdown sums to {}", sum);
        assert_eq!(summary.total_events, 7);
        assert_eq!(summary.counts["sent"], 3);
    }

    #[test]
    fn test_click_to_open_rate_uses_human_openers_only() {
        let campaign = Uuid::new_v4();
        let (r1, r2, r3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let base = t0();

        let mut events = vec![
            event(campaign, r1, "sent", base),
            event(campaign, r2, "sent", base),
            event(campaign, r3, "sent", base),
            // r1: proxy prefetch only
            event(campaign, r1, "open", base + Duration::seconds(2)),
            // r2: prefetch, then a human open and a click
            event(campaign, r2, "open", base + Duration::seconds(3)),
            event(campaign, r2, "open", base + Duration::hours(4)),
            event(campaign, r2, "click", base + Duration::hours(4) + Duration::minutes(1)),
            // r3: prefetch, then a human open, no click
            event(campaign, r3, "open", base + Duration::seconds(5)),
            event(campaign, r3, "open", base + Duration::hours(2)),
        ];
        events.rotate_left(3);

        let analytics = aggregate(&events);
        let e = &analytics.engagement;
        assert_eq!(e.proxy_opens, 3);
        assert_eq!(e.human_opens, 2);
        assert_eq!(e.unique_human_openers, 2);
        assert_eq!(e.unique_clickers, 1);
        // one of two human openers clicked
        assert_eq!(e.click_to_open_rate, 50.0);
    }

    #[test]
    fn test_peak_hours_by_human_open_count() {
        let campaign = Uuid::new_v4();
        let base = Utc.with_ymd_and_hms(2026, 8, 1, 0, 0, 0).unwrap();
        let mut events = Vec::new();

        // Two recipients with human opens at 14:00 UTC, one at 09:00
        for hour in [14, 14, 9] {
            let r = Uuid::new_v4();
            let at = base + Duration::hours(hour);
            events.push(event(campaign, r, "open", at - Duration::minutes(30)));
            events.push(event(campaign, r, "open", at));
        }

        let analytics = aggregate(&events);
        assert_eq!(analytics.temporal.peak_hours, vec![14]);
        assert_eq!(analytics.temporal.hourly[14].human_opens, 2);
        assert_eq!(analytics.temporal.hourly[9].human_opens, 1);
    }

    #[test]
    fn test_hourly_buckets_honor_tz_offset() {
        let campaign = Uuid::new_v4();
        let r = Uuid::new_v4();
        // 23:30 UTC with +60 minutes offset lands in local hour 0
        let mut e = event(
            campaign,
            r,
            "sent",
            Utc.with_ymd_and_hms(2026, 8, 1, 23, 30, 0).unwrap(),
        );
        e.metadata = serde_json::json!({"tz_offset_minutes": 60});

        let analytics = aggregate(&[e]);
        assert_eq!(analytics.temporal.hourly[0].sent, 1);
        assert_eq!(analytics.temporal.hourly[23].sent, 0);
    }

    #[test]
    fn test_malformed_tz_defaults_to_utc() {
        let campaign = Uuid::new_v4();
        let r = Uuid::new_v4();
        let mut e = event(
            campaign,
            r,
            "sent",
            Utc.with_ymd_and_hms(2026, 8, 1, 10, 0, 0).unwrap(),
        );
        e.metadata = serde_json::json!({"tz_offset_minutes": "not-a-number"});

        let analytics = aggregate(&[e]);
        assert_eq!(analytics.temporal.hourly[10].sent, 1);
    }

    #[test]
    fn test_recipient_tiers() {
        let campaign = Uuid::new_v4();
        let base = t0();

        // engaged: 2 human opens + 1 click = 5 -> high
        let engaged = Uuid::new_v4();
        // casual: 1 human open = 1... needs >= 2 for moderate, so 2 human opens = 2 -> moderate
        let casual = Uuid::new_v4();
        // cold: proxy only = 0 -> low
        let cold = Uuid::new_v4();

        let events = vec![
            event(campaign, engaged, "open", base),
            event(campaign, engaged, "open", base + Duration::hours(1)),
            event(campaign, engaged, "open", base + Duration::hours(2)),
            event(campaign, engaged, "click", base + Duration::hours(2)),
            event(campaign, casual, "open", base),
            event(campaign, casual, "open", base + Duration::hours(1)),
            event(campaign, casual, "open", base + Duration::hours(3)),
            event(campaign, cold, "open", base),
        ];

        let insights = aggregate(&events).recipients;
        assert_eq!(insights.total_recipients, 3);
        assert_eq!(insights.high, 1);
        assert_eq!(insights.moderate, 1);
        assert_eq!(insights.low, 1);
        assert_eq!(insights.top_recipients[0].recipient_id, engaged);
        assert_eq!(insights.top_recipients[0].score, 5);
    }

    #[test]
    fn test_response_times() {
        let campaign = Uuid::new_v4();
        let r = Uuid::new_v4();
        let base = t0();

        let events = vec![
            event(campaign, r, "sent", base),
            // prefetch right away, human open 4 hours later
            event(campaign, r, "open", base + Duration::seconds(2)),
            event(campaign, r, "open", base + Duration::hours(4)),
            event(campaign, r, "click", base + Duration::hours(4) + Duration::minutes(30)),
        ];

        let rt = aggregate(&events).response_times;
        assert_eq!(rt.sent_to_open_minutes, Some(240.0));
        assert_eq!(rt.open_to_click_minutes, Some(30.0));
    }

    #[test]
    fn test_missing_user_agent_excluded_per_axis() {
        let campaign = Uuid::new_v4();
        let base = t0();

        let mut with_ua = event(campaign, Uuid::new_v4(), "open", base);
        with_ua.user_agent = Some("Mozilla/5.0 (Windows NT 10.0) Chrome/120.0".to_string());
        with_ua.country = Some("DE".to_string());

        let mut no_ua = event(campaign, Uuid::new_v4(), "open", base);
        no_ua.country = Some("JP".to_string());

        let dist = aggregate(&[with_ua, no_ua]).distributions;
        // Only one open was parseable for the agent axes
        let os_total: u64 = dist.opens.os.iter().map(|b| b.count).sum();
        assert_eq!(os_total, 1);
        // Both opens carried a country
        let country_total: u64 = dist.opens.country.iter().map(|b| b.count).sum();
        assert_eq!(country_total, 2);
    }

    #[test]
    fn test_quality_score_bounds() {
        let campaign = Uuid::new_v4();
        let base = t0();

        // All bounces drives the raw score negative; it clamps at zero
        let bounces: Vec<TrackingEvent> = (0..5)
            .map(|_| event(campaign, Uuid::new_v4(), "bounce", base))
            .collect();
        let analytics = aggregate(&bounces);
        assert_eq!(analytics.engagement.quality_score, 0.0);

        // Heavy engagement clamps at ten
        let r = Uuid::new_v4();
        let mut hot = vec![event(campaign, r, "sent", base)];
        for i in 0..10 {
            hot.push(event(campaign, r, "open", base + Duration::minutes(i)));
            hot.push(event(campaign, r, "click", base + Duration::minutes(i)));
        }
        let analytics = aggregate(&hot);
        assert_eq!(analytics.engagement.quality_score, 10.0);
    }
}
