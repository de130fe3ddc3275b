//! Display projections over [`DisplaySnapshot`]s.
//!
//! Surfaces never read raw records; they only project what a window has
//! revealed. Both projections here are clock-free like the engine.

use std::time::{Duration, Instant};

use crate::config::DisplayConfig;
use crate::engine::DisplaySnapshot;
use crate::record::TranslationRecord;

// =============================================================================
// LingerView
// =============================================================================

/// Main display: keeps the last run on screen while it fades out.
///
/// While a run is active the view tracks the latest non-empty rendered list.
/// When the run ends the content stays for the fade-out window, then clears.
/// A new run discards lingering content immediately.
#[derive(Debug, Clone)]
pub struct LingerView {
    fade_out: Duration,
    content: Vec<TranslationRecord>,
    active: bool,
    clear_at: Option<Instant>,
}

impl LingerView {
    #[must_use]
    pub fn new(fade_out: Duration) -> Self {
        Self {
            fade_out,
            content: Vec::new(),
            active: false,
            clear_at: None,
        }
    }

    #[must_use]
    pub fn from_config(display: &DisplayConfig) -> Self {
        Self::new(display.fade_out())
    }

    pub fn observe(&mut self, snapshot: &DisplaySnapshot, now: Instant) {
        if snapshot.is_active {
            if !self.active {
                self.content.clear();
                self.active = true;
            }
            self.clear_at = None;
            if !snapshot.rendered.is_empty() {
                self.content.clone_from(&snapshot.rendered);
            }
        } else if self.active {
            self.active = false;
            self.clear_at = (!self.content.is_empty()).then(|| now + self.fade_out);
        }
    }

    /// Clear content whose fade-out elapsed. Returns whether it cleared.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.clear_at {
            Some(at) if at <= now => {
                self.content.clear();
                self.clear_at = None;
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.clear_at
    }

    #[must_use]
    pub fn content(&self) -> &[TranslationRecord] {
        &self.content
    }

    #[must_use]
    pub fn is_fading(&self) -> bool {
        self.clear_at.is_some()
    }
}

// =============================================================================
// GridProjection
// =============================================================================

/// Fixed number of slots filled in rendered order.
///
/// A rendered list of at most one record wipes every slot first, so a new run
/// starts from an empty grid; longer lists overwrite slots in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridProjection {
    cells: Vec<Option<TranslationRecord>>,
}

impl GridProjection {
    #[must_use]
    pub fn new(cells: usize) -> Self {
        Self {
            cells: vec![None; cells],
        }
    }

    #[must_use]
    pub fn from_config(display: &DisplayConfig) -> Self {
        Self::new(display.grid_cells)
    }

    pub fn update(&mut self, rendered: &[TranslationRecord]) {
        if rendered.len() <= 1 {
            self.cells.fill(None);
        }
        for (cell, record) in self.cells.iter_mut().zip(rendered) {
            *cell = Some(record.clone());
        }
    }

    #[must_use]
    pub fn cells(&self) -> &[Option<TranslationRecord>] {
        &self.cells
    }

    #[must_use]
    pub fn filled(&self) -> usize {
        self.cells.iter().filter(|cell| cell.is_some()).count()
    }
}
