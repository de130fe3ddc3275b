//! Per-window state machine.
//!
//! [`WindowEngine`] owns one window's [`ReconciliationStore`],
//! [`RevealScheduler`] and [`RunLifecycle`] and performs no I/O: every
//! operation takes the current instant and returns the messages the caller
//! must broadcast. The async driver in [`crate::window`] feeds it from the
//! transport, the producer handle and its own deadline timer.
//!
//! Only the window whose run is active paces reveals. Sibling windows stay
//! idle and mirror the active window through `RENDER_TRANSLATION`.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::config::PacingConfig;
use crate::lifecycle::{EndReason, RunLifecycle, RunPhase};
use crate::pacing::RevealScheduler;
use crate::protocol::SyncMessage;
use crate::record::TranslationRecord;
use crate::store::ReconciliationStore;

/// What display surfaces see. Never contains unrevealed records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    pub rendered: Vec<TranslationRecord>,
    pub is_active: bool,
    pub auto_translate_enabled: bool,
    /// Bumped on every visible change.
    pub revision: u64,
}

/// Fingerprint of everything a snapshot exposes.
type DisplayKey = (usize, Option<u64>, bool, bool);

#[derive(Debug, Clone)]
pub struct WindowEngine {
    store: ReconciliationStore,
    scheduler: RevealScheduler,
    lifecycle: RunLifecycle,
    auto_translate_enabled: bool,
    revision: u64,
}

impl WindowEngine {
    #[must_use]
    pub fn new(pacing: PacingConfig) -> Self {
        Self {
            store: ReconciliationStore::new(),
            lifecycle: RunLifecycle::new(pacing.grace()),
            scheduler: RevealScheduler::new(pacing),
            auto_translate_enabled: false,
            revision: 0,
        }
    }

    /// Bootstrap messages to broadcast right after the channel opens.
    #[must_use]
    pub fn open(&self) -> Vec<SyncMessage> {
        vec![SyncMessage::SyncRequest]
    }

    // =========================================================================
    // Producer operations
    // =========================================================================

    /// Record a freshly produced translation.
    pub fn add_translation(&mut self, record: TranslationRecord, now: Instant) -> Vec<SyncMessage> {
        let key = self.display_key();
        if let Some(last) = self.store.last_index() {
            if record.index <= last && !self.store.contains(record.index) {
                warn!(
                    record_index = record.index,
                    last_index = last,
                    "translation index arrived out of order"
                );
            }
        }

        let mut out = Vec::new();
        if self.store.append_raw(record.clone()) {
            debug!(
                run_id = self.lifecycle.run_id(),
                record_index = record.index,
                "translation added"
            );
            out.push(SyncMessage::AddTranslation(record));
        }
        out.extend(self.settle(now));
        self.bump_if_changed(key);
        out
    }

    /// Clear both sequences here and in every sibling.
    pub fn reset_translations(&mut self, now: Instant) -> Vec<SyncMessage> {
        let key = self.display_key();
        self.clear_run();
        info!("translations reset");
        let mut out = vec![SyncMessage::ResetTranslations];
        out.extend(self.settle(now));
        self.bump_if_changed(key);
        out
    }

    /// Flip the run signal. Either transition clears this window's sequences.
    ///
    /// Returns whether the phase changed. Not broadcast.
    pub fn set_active(&mut self, active: bool, now: Instant) -> bool {
        let key = self.display_key();
        let changed = if active {
            self.lifecycle.start()
        } else {
            self.lifecycle.stop()
        };
        if changed {
            self.clear_run();
        }
        self.settle(now);
        self.bump_if_changed(key);
        changed
    }

    pub fn set_auto_translate_enabled(&mut self, enabled: bool) {
        let key = self.display_key();
        self.auto_translate_enabled = enabled;
        self.bump_if_changed(key);
    }

    // =========================================================================
    // Inbound traffic and timers
    // =========================================================================

    /// Apply a sibling's message. Returns replies to broadcast.
    pub fn handle_message(&mut self, message: SyncMessage, now: Instant) -> Vec<SyncMessage> {
        let key = self.display_key();
        trace!(kind = message.kind(), "sync message received");
        let reset = matches!(message, SyncMessage::ResetTranslations);
        let mut out: Vec<SyncMessage> = self.store.apply(message).into_iter().collect();
        if reset {
            self.scheduler.cancel();
        }
        out.extend(self.settle(now));
        self.bump_if_changed(key);
        out
    }

    /// Fire whatever timers are due at `now`.
    pub fn advance(&mut self, now: Instant) -> Vec<SyncMessage> {
        let key = self.display_key();
        let out = self.settle(now);
        self.bump_if_changed(key);
        out
    }

    /// Earliest instant at which [`Self::advance`] has work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.scheduler.deadline(), self.lifecycle.grace_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    // =========================================================================
    // Readers
    // =========================================================================

    #[must_use]
    pub fn rendered(&self) -> &[TranslationRecord] {
        self.store.rendered()
    }

    #[must_use]
    pub fn store(&self) -> &ReconciliationStore {
        &self.store
    }

    #[must_use]
    pub fn scheduler(&self) -> &RevealScheduler {
        &self.scheduler
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.lifecycle.is_active()
    }

    #[must_use]
    pub fn phase(&self) -> RunPhase {
        self.lifecycle.phase()
    }

    #[must_use]
    pub fn auto_translate_enabled(&self) -> bool {
        self.auto_translate_enabled
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    #[must_use]
    pub fn snapshot(&self) -> DisplaySnapshot {
        DisplaySnapshot {
            rendered: self.store.rendered().to_vec(),
            is_active: self.is_active(),
            auto_translate_enabled: self.auto_translate_enabled,
            revision: self.revision,
        }
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn clear_run(&mut self) {
        self.store.clear();
        self.scheduler.cancel();
    }

    /// Reveal if due, then let the lifecycle and scheduler catch up.
    fn settle(&mut self, now: Instant) -> Vec<SyncMessage> {
        let mut out = Vec::new();

        if let Some(candidate) = self.scheduler.take_due(now) {
            if self.store.append_rendered(candidate.clone()) {
                info!(
                    run_id = self.lifecycle.run_id(),
                    record_index = candidate.index,
                    rendered = self.store.rendered_len(),
                    raw = self.store.raw_len(),
                    "translation revealed"
                );
                out.push(SyncMessage::RenderTranslation(candidate));
            }
        }

        self.lifecycle.observe(&self.store, now);
        if self.lifecycle.poll(now) == Some(EndReason::CaughtUp) {
            self.clear_run();
        }

        self.scheduler
            .reconcile(&self.store, self.lifecycle.is_active(), now);
        out
    }

    fn display_key(&self) -> DisplayKey {
        (
            self.store.rendered_len(),
            self.store.rendered().last().map(|r| r.index),
            self.lifecycle.is_active(),
            self.auto_translate_enabled,
        )
    }

    fn bump_if_changed(&mut self, before: DisplayKey) {
        if self.display_key() != before {
            self.revision += 1;
        }
    }
}
