//! Property-based tests for the reconciliation store.
//!
//! Covers:
//! - rendered stays an arrival-ordered prefix of raw under any message mix
//! - no index appears twice in either sequence
//! - re-applying ADD/RENDER/SYNC_RESPONSE is a no-op
//! - a late window converges on exactly its sibling's rendered sequence

use std::collections::HashSet;

use proptest::prelude::*;

use transcast_core::protocol::SyncMessage;
use transcast_core::record::TranslationRecord;
use transcast_core::store::ReconciliationStore;

// =============================================================================
// Strategies
// =============================================================================

fn record(index: u64) -> TranslationRecord {
    TranslationRecord::new(index, "src", "Swahili", format!("out-{index}"), "back")
}

fn arb_message() -> impl Strategy<Value = SyncMessage> {
    prop_oneof![
        6 => (0u64..24).prop_map(|i| SyncMessage::AddTranslation(record(i))),
        4 => (0u64..24).prop_map(|i| SyncMessage::RenderTranslation(record(i))),
        1 => Just(SyncMessage::ResetTranslations),
        1 => Just(SyncMessage::SyncRequest),
        2 => prop::collection::vec(0u64..24, 0..6)
            .prop_map(|ids| SyncMessage::SyncResponse(ids.into_iter().map(record).collect())),
    ]
}

/// Operations of a single active window with increasing indices.
#[derive(Debug, Clone)]
enum LocalOp {
    Add,
    RevealNext,
    SiblingRevealsNext,
}

fn arb_local_op() -> impl Strategy<Value = LocalOp> {
    prop_oneof![
        3 => Just(LocalOp::Add),
        2 => Just(LocalOp::RevealNext),
        1 => Just(LocalOp::SiblingRevealsNext),
    ]
}

fn indices(records: &[TranslationRecord]) -> Vec<u64> {
    records.iter().map(|r| r.index).collect()
}

fn has_no_duplicates(records: &[TranslationRecord]) -> bool {
    let mut seen = HashSet::new();
    records.iter().all(|r| seen.insert(r.index))
}

// ────────────────────────────────────────────────────────────────────
// Structural invariants
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Any message sequence keeps rendered a prefix of raw without duplicates.
    #[test]
    fn prop_rendered_is_prefix_of_raw(messages in prop::collection::vec(arb_message(), 0..60)) {
        let mut store = ReconciliationStore::new();
        for message in messages {
            store.apply(message);
            prop_assert!(store.rendered_is_prefix());
            prop_assert!(has_no_duplicates(store.raw()));
            prop_assert!(has_no_duplicates(store.rendered()));
            let raw: HashSet<u64> = store.raw().iter().map(|r| r.index).collect();
            prop_assert!(store.rendered().iter().all(|r| raw.contains(&r.index)));
        }
    }

    /// With increasing indices, reveals follow arrival order and never skip.
    #[test]
    fn prop_increasing_indices_reveal_in_order(ops in prop::collection::vec(arb_local_op(), 1..80)) {
        let mut store = ReconciliationStore::new();
        let mut next_index = 0u64;
        for op in ops {
            match op {
                LocalOp::Add => {
                    store.apply(SyncMessage::AddTranslation(record(next_index)));
                    next_index += 1;
                }
                LocalOp::RevealNext => {
                    if let Some(next) = store.next_unrevealed().cloned() {
                        store.append_rendered(next);
                    }
                }
                LocalOp::SiblingRevealsNext => {
                    if let Some(next) = store.next_unrevealed().cloned() {
                        store.apply(SyncMessage::RenderTranslation(next));
                    }
                }
            }
            let rendered = indices(store.rendered());
            let expected: Vec<u64> = (0..rendered.len() as u64).collect();
            prop_assert_eq!(&rendered, &expected);
            prop_assert_eq!(indices(&store.raw()[..rendered.len()]), rendered);
        }
    }
}

// ────────────────────────────────────────────────────────────────────
// Idempotence
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Applying a state-merging message twice equals applying it once.
    #[test]
    fn prop_merges_are_idempotent(
        prefix in prop::collection::vec(arb_message(), 0..30),
        message in arb_message(),
    ) {
        let mut once = ReconciliationStore::new();
        for m in &prefix {
            once.apply(m.clone());
        }
        let mut twice = once.clone();

        once.apply(message.clone());
        twice.apply(message.clone());
        twice.apply(message);

        prop_assert_eq!(once.raw(), twice.raw());
        prop_assert_eq!(once.rendered(), twice.rendered());
    }
}

// ────────────────────────────────────────────────────────────────────
// Late-join convergence
// ────────────────────────────────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    /// A window bootstrapping from a sibling gets exactly the revealed records.
    #[test]
    fn prop_late_window_converges_on_revealed_only(
        added in 0u64..30,
        revealed_fraction in 0.0f64..=1.0,
    ) {
        let mut sibling = ReconciliationStore::new();
        for i in 0..added {
            sibling.append_raw(record(i));
        }
        let revealed = ((added as f64) * revealed_fraction).floor() as u64;
        for i in 0..revealed {
            sibling.append_rendered(record(i));
        }

        let mut late = ReconciliationStore::new();
        let request_reply = sibling.apply(SyncMessage::SyncRequest);
        if revealed == 0 {
            prop_assert!(request_reply.is_none());
        }
        if let Some(reply) = request_reply {
            late.apply(reply);
        }

        prop_assert_eq!(late.rendered(), sibling.rendered());
        prop_assert_eq!(late.raw(), sibling.rendered());
        prop_assert!(late.next_unrevealed().is_none());
    }
}
