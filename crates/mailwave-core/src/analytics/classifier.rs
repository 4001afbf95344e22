//! Proxy/human open classification.
//!
//! Mail privacy proxies (Apple MPP, Gmail image caching) fetch the
//! tracking pixel automatically when the message arrives, before any
//! human sees it. That prefetch is always the chronologically first open
//! for a recipient, so classification is purely positional: within each
//! (campaign, recipient) group the first open is the proxy fetch and
//! every later open is a human one. A recipient with a single open
//! therefore counts as proxy-only, never as engaged.

use mailwave_common::types::EventId;
use mailwave_storage::models::TrackingEvent;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Classification of a single open event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenKind {
    Proxy,
    Human,
}

/// Classify every open event in the slice. Non-open events are ignored.
///
/// The result maps event id to its classification. Ordering within a
/// recipient group is by `occurred_at` with the event id as tie-break,
/// so re-running over the same stream always yields the same answer.
pub fn classify_opens(events: &[TrackingEvent]) -> HashMap<EventId, OpenKind> {
    let mut groups: HashMap<(uuid::Uuid, uuid::Uuid), Vec<&TrackingEvent>> = HashMap::new();

    for event in events {
        if event.event_type == "open" {
            groups
                .entry((event.campaign_id, event.recipient_id))
                .or_default()
                .push(event);
        }
    }

    let mut result = HashMap::new();
    for group in groups.values_mut() {
        group.sort_by_key(|e| (e.occurred_at, e.id));
        for (i, event) in group.iter().enumerate() {
            let kind = if i == 0 { OpenKind::Proxy } else { OpenKind::Human };
            result.insert(event.id, kind);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    fn open_event(
        campaign_id: Uuid,
        recipient_id: Uuid,
        at: chrono::DateTime<Utc>,
    ) -> TrackingEvent {
        TrackingEvent {
            campaign_id,
            id: Uuid::new_v4(),
            recipient_id,
            email: None,
            event_type: "open".to_string(),
            variation_id: None,
            occurred_at: at,
            user_agent: None,
            ip_address: None,
            country: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn test_first_open_is_proxy_rest_human() {
        let campaign = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();

        // Prefetch two seconds after delivery, real open four hours later
        let prefetch = open_event(campaign, recipient, t0 + Duration::seconds(2));
        let real = open_event(campaign, recipient, t0 + Duration::hours(4));
        let later = open_event(campaign, recipient, t0 + Duration::hours(5));

        let kinds = classify_opens(&[real.clone(), prefetch.clone(), later.clone()]);
        assert_eq!(kinds[&prefetch.id], OpenKind::Proxy);
        assert_eq!(kinds[&real.id], OpenKind::Human);
        assert_eq!(kinds[&later.id], OpenKind::Human);
    }

    #[test]
    fn test_single_open_counts_as_proxy_only() {
        let only = open_event(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap(),
        );
        let kinds = classify_opens(&[only.clone()]);
        assert_eq!(kinds[&only.id], OpenKind::Proxy);
        assert_eq!(kinds.len(), 1);
    }

    #[test]
    fn test_groups_are_independent_per_recipient() {
        let campaign = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();

        let a1 = open_event(campaign, Uuid::new_v4(), t0);
        let b1 = open_event(campaign, Uuid::new_v4(), t0 + Duration::seconds(1));

        let kinds = classify_opens(&[a1.clone(), b1.clone()]);
        // Each recipient's first open is proxy regardless of global order
        assert_eq!(kinds[&a1.id], OpenKind::Proxy);
        assert_eq!(kinds[&b1.id], OpenKind::Proxy);
    }

    #[test]
    fn test_deterministic_across_input_order() {
        let campaign = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let t0 = Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap();

        let e1 = open_event(campaign, recipient, t0);
        let e2 = open_event(campaign, recipient, t0 + Duration::minutes(10));
        let e3 = open_event(campaign, recipient, t0 + Duration::minutes(20));

        let forward = classify_opens(&[e1.clone(), e2.clone(), e3.clone()]);
        let reverse = classify_opens(&[e3.clone(), e2.clone(), e1.clone()]);
        assert_eq!(forward, reverse);
    }

    #[test]
    fn test_non_open_events_ignored() {
        let mut click = open_event(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Utc.with_ymd_and_hms(2026, 8, 1, 9, 0, 0).unwrap(),
        );
        click.event_type = "click".to_string();

        let kinds = classify_opens(&[click]);
        assert!(kinds.is_empty());
    }
}
