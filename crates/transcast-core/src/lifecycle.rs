//! Run lifecycle: the Idle/Active signal every display surface reads.
//!
//! ```text
//!          start()                      catch-up + grace elapsed
//!   Idle ──────────► Active ─────────────────────────────────────► Idle
//!                      │                 stop() (producer failure)   ▲
//!                      └─────────────────────────────────────────────┘
//! ```
//!
//! Catch-up is [`ReconciliationStore::is_caught_up`]. The grace timer
//! starts on catch-up and restarts (or is cancelled) on every change to either
//! length, so late arrivals keep the run alive and the last reveal is never
//! cut short.
//!
//! Clearing the sequences on either transition is the caller's job; this type
//! only owns the signal and the grace deadline.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::store::ReconciliationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    Active,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The producer ended it (terminal failure or explicit stop).
    Explicit,
    /// Pacing caught up and the grace delay elapsed.
    CaughtUp,
}

#[derive(Debug, Clone)]
pub struct RunLifecycle {
    phase: RunPhase,
    grace: Duration,
    grace_deadline: Option<Instant>,
    observed: (usize, usize),
    run_id: u64,
}

impl RunLifecycle {
    #[must_use]
    pub fn new(grace: Duration) -> Self {
        Self {
            phase: RunPhase::Idle,
            grace,
            grace_deadline: None,
            observed: (0, 0),
            run_id: 0,
        }
    }

    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.phase == RunPhase::Active
    }

    #[must_use]
    pub fn grace_deadline(&self) -> Option<Instant> {
        self.grace_deadline
    }

    /// Number of runs this window has started; the current run's id while active.
    #[must_use]
    pub fn run_id(&self) -> u64 {
        self.run_id
    }

    /// Idle → Active. Returns `false` if a run was already active.
    pub fn start(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        self.phase = RunPhase::Active;
        self.grace_deadline = None;
        self.observed = (0, 0);
        self.run_id += 1;
        info!(run_id = self.run_id, "run started");
        true
    }

    /// Active → Idle on the producer's request. Returns `false` if already idle.
    pub fn stop(&mut self) -> bool {
        self.finish(EndReason::Explicit)
    }

    fn finish(&mut self, reason: EndReason) -> bool {
        if !self.is_active() {
            return false;
        }
        self.phase = RunPhase::Idle;
        self.grace_deadline = None;
        info!(run_id = self.run_id, reason = ?reason, "run ended");
        true
    }

    /// Feed the store's current state. Call after every store change.
    pub fn observe(&mut self, store: &ReconciliationStore, now: Instant) {
        if !self.is_active() {
            return;
        }

        let (raw_len, rendered_len) = (store.raw_len(), store.rendered_len());
        let caught_up = store.is_caught_up();
        let changed = self.observed != (raw_len, rendered_len);
        self.observed = (raw_len, rendered_len);

        if changed {
            self.grace_deadline = caught_up.then(|| now + self.grace);
            if caught_up {
                debug!(
                    run_id = self.run_id,
                    raw_len,
                    grace_ms = self.grace.as_millis() as u64,
                    "pacing caught up; grace timer armed"
                );
            }
        } else if caught_up && self.grace_deadline.is_none() {
            self.grace_deadline = Some(now + self.grace);
        }
    }

    /// Finalize the run if the grace deadline passed.
    pub fn poll(&mut self, now: Instant) -> Option<EndReason> {
        match self.grace_deadline {
            Some(deadline) if deadline <= now => {
                self.finish(EndReason::CaughtUp).then_some(EndReason::CaughtUp)
            }
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::TranslationRecord;

    const GRACE: Duration = Duration::from_millis(10_000);

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Store holding `raw` records, the first `rendered` of them revealed.
    fn store(raw: u64, rendered: u64) -> ReconciliationStore {
        let mut store = ReconciliationStore::new();
        for index in 0..raw {
            let record = TranslationRecord::new(index, "in", "Welsh", "out", "back");
            if index < rendered {
                store.append_rendered(record.clone());
            }
            store.append_raw(record);
        }
        store
    }

    #[test]
    fn starts_idle() {
        let lifecycle = RunLifecycle::new(GRACE);
        assert_eq!(lifecycle.phase(), RunPhase::Idle);
        assert!(lifecycle.grace_deadline().is_none());
    }

    #[test]
    fn start_and_stop_are_edge_triggered() {
        let mut lifecycle = RunLifecycle::new(GRACE);
        assert!(lifecycle.start());
        assert!(!lifecycle.start());
        assert!(lifecycle.stop());
        assert!(!lifecycle.stop());
    }

    #[test]
    fn each_start_opens_a_new_run() {
        let mut lifecycle = RunLifecycle::new(GRACE);
        assert_eq!(lifecycle.run_id(), 0);
        lifecycle.start();
        lifecycle.start();
        assert_eq!(lifecycle.run_id(), 1);
        lifecycle.stop();
        lifecycle.start();
        assert_eq!(lifecycle.run_id(), 2);
    }

    #[test]
    fn idle_ignores_observations() {
        let t0 = Instant::now();
        let mut lifecycle = RunLifecycle::new(GRACE);
        lifecycle.observe(&store(3, 3), t0);
        assert!(lifecycle.grace_deadline().is_none());
        assert_eq!(lifecycle.poll(t0 + ms(60_000)), None);
    }

    #[test]
    fn empty_run_never_finalizes() {
        let t0 = Instant::now();
        let mut lifecycle = RunLifecycle::new(GRACE);
        lifecycle.start();
        lifecycle.observe(&store(0, 0), t0);
        assert_eq!(lifecycle.poll(t0 + ms(60_000)), None);
        assert!(lifecycle.is_active());
    }

    #[test]
    fn catch_up_arms_grace_then_finalizes() {
        let t0 = Instant::now();
        let mut lifecycle = RunLifecycle::new(GRACE);
        lifecycle.start();
        lifecycle.observe(&store(2, 1), t0);
        assert!(lifecycle.grace_deadline().is_none());

        lifecycle.observe(&store(2, 2), t0 + ms(3_000));
        assert_eq!(lifecycle.grace_deadline(), Some(t0 + ms(13_000)));
        assert_eq!(lifecycle.poll(t0 + ms(12_999)), None);
        assert_eq!(lifecycle.poll(t0 + ms(13_000)), Some(EndReason::CaughtUp));
        assert_eq!(lifecycle.phase(), RunPhase::Idle);
    }

    #[test]
    fn sibling_revealed_records_count_toward_catch_up() {
        let t0 = Instant::now();
        let mut lifecycle = RunLifecycle::new(GRACE);
        lifecycle.start();

        let mut adopted = ReconciliationStore::new();
        adopted.append_rendered(TranslationRecord::new(4, "in", "Welsh", "out", "back"));
        assert_eq!(adopted.raw_len(), 1);

        lifecycle.observe(&adopted, t0);
        assert_eq!(lifecycle.grace_deadline(), Some(t0 + GRACE));
    }

    #[test]
    fn new_arrival_during_grace_cancels_it() {
        let t0 = Instant::now();
        let mut lifecycle = RunLifecycle::new(GRACE);
        lifecycle.start();
        lifecycle.observe(&store(1, 1), t0);
        lifecycle.observe(&store(2, 1), t0 + ms(4_000));
        assert!(lifecycle.grace_deadline().is_none());
        assert_eq!(lifecycle.poll(t0 + ms(10_000)), None);

        lifecycle.observe(&store(2, 2), t0 + ms(7_000));
        assert_eq!(lifecycle.grace_deadline(), Some(t0 + ms(17_000)));
    }

    #[test]
    fn unchanged_observation_keeps_deadline() {
        let t0 = Instant::now();
        let mut lifecycle = RunLifecycle::new(GRACE);
        lifecycle.start();
        lifecycle.observe(&store(1, 1), t0);
        lifecycle.observe(&store(1, 1), t0 + ms(5_000));
        assert_eq!(lifecycle.grace_deadline(), Some(t0 + GRACE));
    }

    #[test]
    fn explicit_stop_clears_grace() {
        let t0 = Instant::now();
        let mut lifecycle = RunLifecycle::new(GRACE);
        lifecycle.start();
        lifecycle.observe(&store(1, 1), t0);
        assert!(lifecycle.stop());
        assert!(lifecycle.grace_deadline().is_none());
        assert_eq!(lifecycle.poll(t0 + GRACE), None);
    }
}
