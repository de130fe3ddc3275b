//! Render pacing: reveal one raw record at a time at a readable cadence.
//!
//! The scheduler is a two-state machine:
//!
//! ```text
//!            reconcile (active, backlog)
//!   Idle ───────────────────────────────► PendingReveal { candidate, due_at }
//!    ▲                                         │
//!    │   take_due (now >= due_at)              │
//!    ├─────────────────────────────────────────┤
//!    │   cancel (run ended / reset /           │
//!    │           candidate revealed elsewhere) │
//!    └─────────────────────────────────────────┘
//! ```
//!
//! There is never more than one pending reveal: a new candidate can only be
//! chosen from `Idle`. Timers are not retried; after a cancel the next
//! `reconcile` recomputes the candidate from the store.
//!
//! The scheduler never touches the clock. Callers pass `now` and sleep until
//! [`RevealScheduler::deadline`].

use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::config::PacingConfig;
use crate::record::TranslationRecord;
use crate::store::ReconciliationStore;

/// Reveal delay for `record` under `pacing`.
#[must_use]
pub fn reveal_delay(record: &TranslationRecord, pacing: &PacingConfig) -> Duration {
    pacing.reveal_delay(record.output_len())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealState {
    Idle,
    PendingReveal {
        candidate: TranslationRecord,
        due_at: Instant,
    },
}

#[derive(Debug, Clone)]
pub struct RevealScheduler {
    state: RevealState,
    pacing: PacingConfig,
}

impl RevealScheduler {
    #[must_use]
    pub fn new(pacing: PacingConfig) -> Self {
        Self {
            state: RevealState::Idle,
            pacing,
        }
    }

    #[must_use]
    pub fn state(&self) -> &RevealState {
        &self.state
    }

    #[must_use]
    pub fn pacing(&self) -> &PacingConfig {
        &self.pacing
    }

    #[must_use]
    pub fn is_pending(&self) -> bool {
        matches!(self.state, RevealState::PendingReveal { .. })
    }

    /// Index of the record waiting to be revealed.
    #[must_use]
    pub fn pending_index(&self) -> Option<u64> {
        match &self.state {
            RevealState::PendingReveal { candidate, .. } => Some(candidate.index),
            RevealState::Idle => None,
        }
    }

    /// When the pending reveal fires.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        match &self.state {
            RevealState::PendingReveal { due_at, .. } => Some(*due_at),
            RevealState::Idle => None,
        }
    }

    /// Re-evaluate after any change to the store or the run signal.
    ///
    /// Cancels when inactive or when the candidate was revealed elsewhere or
    /// cleared; otherwise schedules the next unrevealed record if idle.
    pub fn reconcile(&mut self, store: &ReconciliationStore, active: bool, now: Instant) {
        if !active {
            self.cancel();
            return;
        }

        if let Some(index) = self.pending_index() {
            if store.is_rendered(index) || !store.contains(index) {
                trace!(record_index = index, "pending reveal superseded");
                self.state = RevealState::Idle;
            } else {
                return;
            }
        }

        if let Some(candidate) = store.next_unrevealed() {
            let delay = reveal_delay(candidate, &self.pacing);
            debug!(
                record_index = candidate.index,
                delay_ms = delay.as_millis() as u64,
                backlog = store.raw_len() - store.rendered_len(),
                "reveal scheduled"
            );
            self.state = RevealState::PendingReveal {
                candidate: candidate.clone(),
                due_at: now + delay,
            };
        }
    }

    /// Drop the pending reveal, if any. Returns the abandoned index.
    pub fn cancel(&mut self) -> Option<u64> {
        match std::mem::replace(&mut self.state, RevealState::Idle) {
            RevealState::PendingReveal { candidate, .. } => {
                debug!(record_index = candidate.index, "pending reveal cancelled");
                Some(candidate.index)
            }
            RevealState::Idle => None,
        }
    }

    /// Hand out the candidate once its deadline has passed, returning to `Idle`.
    pub fn take_due(&mut self, now: Instant) -> Option<TranslationRecord> {
        let due = matches!(
            &self.state,
            RevealState::PendingReveal { due_at, .. } if *due_at <= now
        );
        if !due {
            return None;
        }
        match std::mem::replace(&mut self.state, RevealState::Idle) {
            RevealState::PendingReveal { candidate, .. } => Some(candidate),
            RevealState::Idle => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: u64, chars: usize) -> TranslationRecord {
        TranslationRecord::new(index, "src", "Korean", "x".repeat(chars), "back")
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn astral_characters_weigh_two_units() {
        let pacing = PacingConfig::default();
        let emoji = TranslationRecord::new(0, "smile", "Emoji", "\u{1F600}".repeat(40), "smile");
        assert_eq!(reveal_delay(&emoji, &pacing), ms(8_000));

        let hangul = TranslationRecord::new(1, "hi", "Korean", "안".repeat(40), "hi");
        assert_eq!(reveal_delay(&hangul, &pacing), ms(4_000));
    }

    #[test]
    fn idle_without_backlog() {
        let store = ReconciliationStore::new();
        let mut scheduler = RevealScheduler::new(PacingConfig::default());
        scheduler.reconcile(&store, true, Instant::now());
        assert_eq!(scheduler.state(), &RevealState::Idle);
    }

    #[test]
    fn inactive_run_never_schedules() {
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1, 10));
        let mut scheduler = RevealScheduler::new(PacingConfig::default());
        scheduler.reconcile(&store, false, Instant::now());
        assert!(!scheduler.is_pending());
    }

    #[test]
    fn schedules_first_unrevealed_with_clamped_delay() {
        let t0 = Instant::now();
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1, 60));
        store.append_raw(record(2, 5));
        let mut scheduler = RevealScheduler::new(PacingConfig::default());

        scheduler.reconcile(&store, true, t0);
        assert_eq!(scheduler.pending_index(), Some(1));
        assert_eq!(scheduler.deadline(), Some(t0 + ms(6_000)));
    }

    #[test]
    fn at_most_one_pending_reveal() {
        let t0 = Instant::now();
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1, 10));
        let mut scheduler = RevealScheduler::new(PacingConfig::default());
        scheduler.reconcile(&store, true, t0);

        store.append_raw(record(2, 10));
        scheduler.reconcile(&store, true, t0 + ms(1_000));
        scheduler.reconcile(&store, true, t0 + ms(2_000));

        assert_eq!(scheduler.pending_index(), Some(1));
        assert_eq!(scheduler.deadline(), Some(t0 + ms(3_000)));
    }

    #[test]
    fn take_due_respects_deadline() {
        let t0 = Instant::now();
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1, 10));
        let mut scheduler = RevealScheduler::new(PacingConfig::default());
        scheduler.reconcile(&store, true, t0);

        assert!(scheduler.take_due(t0 + ms(2_999)).is_none());
        let revealed = scheduler.take_due(t0 + ms(3_000)).unwrap();
        assert_eq!(revealed.index, 1);
        assert!(!scheduler.is_pending());
        assert!(scheduler.take_due(t0 + ms(9_000)).is_none());
    }

    #[test]
    fn deactivation_cancels_without_reveal() {
        let t0 = Instant::now();
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1, 10));
        let mut scheduler = RevealScheduler::new(PacingConfig::default());
        scheduler.reconcile(&store, true, t0);

        scheduler.reconcile(&store, false, t0 + ms(1_000));
        assert!(scheduler.take_due(t0 + ms(10_000)).is_none());
    }

    #[test]
    fn candidate_revealed_by_sibling_is_dropped_and_next_scheduled() {
        let t0 = Instant::now();
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1, 10));
        store.append_raw(record(2, 80));
        let mut scheduler = RevealScheduler::new(PacingConfig::default());
        scheduler.reconcile(&store, true, t0);

        store.append_rendered(record(1, 10));
        scheduler.reconcile(&store, true, t0 + ms(500));

        assert_eq!(scheduler.pending_index(), Some(2));
        assert_eq!(scheduler.deadline(), Some(t0 + ms(500) + ms(8_000)));
    }

    #[test]
    fn cleared_store_drops_candidate() {
        let t0 = Instant::now();
        let mut store = ReconciliationStore::new();
        store.append_raw(record(1, 10));
        let mut scheduler = RevealScheduler::new(PacingConfig::default());
        scheduler.reconcile(&store, true, t0);

        store.clear();
        scheduler.reconcile(&store, true, t0 + ms(100));
        assert_eq!(scheduler.state(), &RevealState::Idle);
    }

    #[test]
    fn cancel_reports_abandoned_index() {
        let mut store = ReconciliationStore::new();
        store.append_raw(record(9, 10));
        let mut scheduler = RevealScheduler::new(PacingConfig::default());
        scheduler.reconcile(&store, true, Instant::now());
        assert_eq!(scheduler.cancel(), Some(9));
        assert_eq!(scheduler.cancel(), None);
    }
}
