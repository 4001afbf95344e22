//! Deterministic variation assignment.
//!
//! A contact's variation is a pure function of its id, so re-running
//! materialization after a crash reassigns every contact identically and
//! never flips anyone between variations.

use mailwave_common::types::ContactId;
use sha2::{Digest, Sha256};

/// Assign a contact to one of the variation ids. Returns `None` when the
/// variation list is empty. The ids are considered in sorted order, so
/// the assignment is stable regardless of how the config lists them.
pub fn assign_variation(variation_ids: &[String], contact_id: ContactId) -> Option<String> {
    if variation_ids.is_empty() {
        return None;
    }

    let mut sorted: Vec<&String> = variation_ids.iter().collect();
    sorted.sort();

    let digest = Sha256::digest(contact_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let hash = u64::from_be_bytes(prefix);

    let index = (hash % sorted.len() as u64) as usize;
    Some(sorted[index].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use uuid::Uuid;

    #[test]
    fn test_assignment_is_deterministic() {
        let variations = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let contact = Uuid::new_v4();

        let first = assign_variation(&variations, contact);
        for _ in 0..10 {
            assert_eq!(assign_variation(&variations, contact), first);
        }
    }

    #[test]
    fn test_assignment_ignores_listing_order() {
        let contact = Uuid::new_v4();
        let forward = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let shuffled = vec!["c".to_string(), "a".to_string(), "b".to_string()];

        assert_eq!(
            assign_variation(&forward, contact),
            assign_variation(&shuffled, contact)
        );
    }

    #[test]
    fn test_assignment_is_roughly_even() {
        let variations = vec!["a".to_string(), "b".to_string()];
        let mut counts: HashMap<String, usize> = HashMap::new();

        for _ in 0..1000 {
            let v = assign_variation(&variations, Uuid::new_v4()).unwrap();
            *counts.entry(v).or_default() += 1;
        }

        // Both arms should land well within a loose band around 50/50
        for (_, count) in counts {
            assert!((300..=700).contains(&count), "skewed split: {}", count);
        }
    }

    #[test]
    fn test_empty_variations() {
        assert_eq!(assign_variation(&[], Uuid::new_v4()), None);
    }
}
