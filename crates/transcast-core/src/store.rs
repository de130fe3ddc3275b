//! Reconciliation store: the raw and rendered sequences of one window.
//!
//! Both sequences are keyed by [`TranslationRecord::index`] and every merge is
//! idempotent, so replaying any broadcast (including a window's own traffic
//! coming back through a sibling) leaves state unchanged.
//!
//! The store maintains one structural invariant at all times:
//!
//! ```text
//! rendered == raw[..rendered.len()]
//! ```
//!
//! A record revealed by a sibling is moved (or adopted, if this window never
//! saw its `ADD_TRANSLATION`) to the end of the revealed prefix of `raw`. That
//! keeps "nothing rendered that is not raw" true for late-joining windows
//! without ever pulling an unrevealed record forward.

use std::collections::HashSet;

use tracing::trace;

use crate::protocol::SyncMessage;
use crate::record::TranslationRecord;

#[derive(Debug, Clone, Default)]
pub struct ReconciliationStore {
    raw: Vec<TranslationRecord>,
    rendered: Vec<TranslationRecord>,
    raw_ids: HashSet<u64>,
    rendered_ids: HashSet<u64>,
}

impl ReconciliationStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All records received this run, arrival order.
    #[must_use]
    pub fn raw(&self) -> &[TranslationRecord] {
        &self.raw
    }

    /// Records already revealed, reveal order.
    #[must_use]
    pub fn rendered(&self) -> &[TranslationRecord] {
        &self.rendered
    }

    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.raw.len()
    }

    #[must_use]
    pub fn rendered_len(&self) -> usize {
        self.rendered.len()
    }

    #[must_use]
    pub fn contains(&self, index: u64) -> bool {
        self.raw_ids.contains(&index)
    }

    #[must_use]
    pub fn is_rendered(&self, index: u64) -> bool {
        self.rendered_ids.contains(&index)
    }

    /// Highest index seen in `raw`, if any.
    #[must_use]
    pub fn last_index(&self) -> Option<u64> {
        self.raw.last().map(|r| r.index)
    }

    /// First record not yet revealed.
    #[must_use]
    pub fn next_unrevealed(&self) -> Option<&TranslationRecord> {
        self.raw.get(self.rendered.len())
    }

    /// Pacing has revealed everything received so far (and something was received).
    #[must_use]
    pub fn is_caught_up(&self) -> bool {
        !self.raw.is_empty() && self.rendered.len() == self.raw.len()
    }

    /// Append to `raw` unless the index is already present.
    pub fn append_raw(&mut self, record: TranslationRecord) -> bool {
        if !self.raw_ids.insert(record.index) {
            trace!(record_index = record.index, "duplicate raw record ignored");
            return false;
        }
        self.raw.push(record);
        true
    }

    /// Append to `rendered` unless the index is already present.
    ///
    /// The record is positioned at the end of the revealed prefix of `raw`,
    /// inserting it there if `raw` did not hold it yet.
    pub fn append_rendered(&mut self, record: TranslationRecord) -> bool {
        if self.rendered_ids.contains(&record.index) {
            trace!(record_index = record.index, "duplicate rendered record ignored");
            return false;
        }

        let prefix = self.rendered.len();
        if self.raw_ids.contains(&record.index) {
            if let Some(pos) = self.raw.iter().position(|r| r.index == record.index) {
                if pos != prefix {
                    let moved = self.raw.remove(pos);
                    self.raw.insert(prefix, moved);
                }
            }
        } else {
            self.raw_ids.insert(record.index);
            self.raw.insert(prefix, record.clone());
        }

        self.rendered_ids.insert(record.index);
        self.rendered.push(record);
        debug_assert!(self.rendered_is_prefix());
        true
    }

    /// Merge a sibling's rendered sequence, keeping local order and appending
    /// records this window has not revealed. Returns how many were added.
    pub fn merge_rendered<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = TranslationRecord>,
    {
        records
            .into_iter()
            .map(|record| usize::from(self.append_rendered(record)))
            .sum()
    }

    /// Clear both sequences.
    pub fn clear(&mut self) {
        self.raw.clear();
        self.rendered.clear();
        self.raw_ids.clear();
        self.rendered_ids.clear();
    }

    /// Reply for a sibling's bootstrap request, if there is anything to share.
    #[must_use]
    pub fn sync_response(&self) -> Option<SyncMessage> {
        if self.rendered.is_empty() {
            None
        } else {
            Some(SyncMessage::SyncResponse(self.rendered.clone()))
        }
    }

    /// Apply an inbound message. Returns the reply to broadcast, if any.
    pub fn apply(&mut self, message: SyncMessage) -> Option<SyncMessage> {
        match message {
            SyncMessage::AddTranslation(record) => {
                self.append_raw(record);
                None
            }
            SyncMessage::RenderTranslation(record) => {
                self.append_rendered(record);
                None
            }
            SyncMessage::ResetTranslations => {
                self.clear();
                None
            }
            SyncMessage::SyncRequest => self.sync_response(),
            SyncMessage::SyncResponse(records) => {
                self.merge_rendered(records);
                None
            }
        }
    }

    /// `rendered` equals the leading slice of `raw`.
    #[must_use]
    pub fn rendered_is_prefix(&self) -> bool {
        self.rendered.len() <= self.raw.len()
            && self
                .rendered
                .iter()
                .zip(&self.raw)
                .all(|(rendered, raw)| rendered.index == raw.index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u64) -> TranslationRecord {
        TranslationRecord::new(index, "cat", "Spanish", format!("gato {index}"), "cat")
    }

    fn indices(records: &[TranslationRecord]) -> Vec<u64> {
        records.iter().map(|r| r.index).collect()
    }

    #[test]
    fn add_is_idempotent() {
        let mut store = ReconciliationStore::new();
        assert!(store.append_raw(record(1)));
        assert!(!store.append_raw(record(1)));
        store.apply(SyncMessage::AddTranslation(record(1)));
        assert_eq!(indices(store.raw()), vec![1]);
    }

    #[test]
    fn render_is_idempotent() {
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1));
        store.apply(SyncMessage::RenderTranslation(record(1)));
        store.apply(SyncMessage::RenderTranslation(record(1)));
        assert_eq!(indices(store.rendered()), vec![1]);
        assert_eq!(indices(store.raw()), vec![1]);
    }

    #[test]
    fn next_unrevealed_follows_arrival_order() {
        let mut store = ReconciliationStore::new();
        for i in [4, 7, 9] {
            store.append_raw(record(i));
        }
        assert_eq!(store.next_unrevealed().map(|r| r.index), Some(4));
        store.append_rendered(record(4));
        assert_eq!(store.next_unrevealed().map(|r| r.index), Some(7));
        store.append_rendered(record(7));
        store.append_rendered(record(9));
        assert!(store.next_unrevealed().is_none());
        assert!(store.is_caught_up());
    }

    #[test]
    fn empty_store_is_not_caught_up() {
        assert!(!ReconciliationStore::new().is_caught_up());
    }

    #[test]
    fn sibling_reveal_of_later_record_moves_it_into_prefix() {
        let mut store = ReconciliationStore::new();
        for i in 1..=3 {
            store.append_raw(record(i));
        }
        store.apply(SyncMessage::RenderTranslation(record(3)));
        assert_eq!(indices(store.rendered()), vec![3]);
        assert_eq!(indices(store.raw()), vec![3, 1, 2]);
        assert!(store.rendered_is_prefix());
    }

    #[test]
    fn render_without_add_adopts_into_raw() {
        let mut store = ReconciliationStore::new();
        store.append_raw(record(5));
        store.apply(SyncMessage::RenderTranslation(record(2)));
        assert_eq!(indices(store.raw()), vec![2, 5]);
        assert_eq!(indices(store.rendered()), vec![2]);
        assert_eq!(store.next_unrevealed().map(|r| r.index), Some(5));
    }

    #[test]
    fn sync_request_replies_only_when_rendered_nonempty() {
        let mut store = ReconciliationStore::new();
        assert_eq!(store.apply(SyncMessage::SyncRequest), None);

        store.append_raw(record(1));
        store.append_raw(record(2));
        assert_eq!(store.apply(SyncMessage::SyncRequest), None);

        store.append_rendered(record(1));
        assert_eq!(
            store.apply(SyncMessage::SyncRequest),
            Some(SyncMessage::SyncResponse(vec![record(1)]))
        );
    }

    #[test]
    fn sync_response_merges_preserving_local_order() {
        let mut store = ReconciliationStore::new();
        store.append_rendered(record(1));
        store.append_rendered(record(3));

        store.apply(SyncMessage::SyncResponse(vec![record(1), record(2), record(3), record(4)]));

        assert_eq!(indices(store.rendered()), vec![1, 3, 2, 4]);
        assert!(store.rendered_is_prefix());
    }

    #[test]
    fn sync_response_never_adds_unrevealed_records() {
        let mut store = ReconciliationStore::new();
        store.apply(SyncMessage::SyncResponse(vec![record(0), record(1)]));
        assert_eq!(store.raw_len(), 2);
        assert_eq!(store.rendered_len(), 2);
        assert!(store.next_unrevealed().is_none());
    }

    #[test]
    fn reset_clears_both_sequences_and_ids() {
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1));
        store.append_rendered(record(1));
        store.apply(SyncMessage::ResetTranslations);
        assert!(store.raw().is_empty());
        assert!(store.rendered().is_empty());
        assert!(!store.contains(1));
        assert!(store.append_raw(record(1)));
    }
}
