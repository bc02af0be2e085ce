//! Free-chunk reserve targets per class and for the global pool.
//!
//! The reserve keeps a slice of every class free so a page move never
//! strands in-flight items, and keeps a slice of the total page count
//! unassigned in the global pool. Recomputation is rate-limited; the
//! targets between refreshes are deliberately stale.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::stats::{ClassDelta, Totals};

/// Hard floor on a class reserve, in pages' worth of chunks.
const MIN_PAGES_FREE: f64 = 1.5;

/// Target free chunks per class plus a global free-page target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FreeBudget {
    /// Pages the global pool should hold.
    pub global_pages: u64,
    /// Free chunks each class should hold.
    pub classes: BTreeMap<u16, u64>,
}

impl FreeBudget {
    /// Target free chunks for a class; unknown classes target zero.
    pub fn class(&self, sid: u16) -> u64 {
        self.classes.get(&sid).copied().unwrap_or(0)
    }
}

/// Rate-limited recomputation of [`FreeBudget`].
#[derive(Debug)]
pub struct BudgetEstimator {
    free_ratio: f64,
    refresh_interval: Duration,
    last_refresh: Option<Instant>,
}

impl BudgetEstimator {
    pub fn new(free_ratio: f64, refresh_interval: Duration) -> Self {
        Self {
            free_ratio,
            refresh_interval,
            last_refresh: None,
        }
    }

    /// Whether a refresh should run this cycle.
    ///
    /// Requires the totals to carry page information and the configured
    /// interval to have elapsed since the last refresh. The first call
    /// after construction or [`reset`](Self::reset) is always due.
    pub fn due(&self, totals: &Totals) -> bool {
        if totals.current.total_pages == 0 {
            return false;
        }
        match self.last_refresh {
            None => true,
            Some(at) => at.elapsed() >= self.refresh_interval,
        }
    }

    /// Recompute reserve targets from the current cycle's view.
    ///
    /// Per class: `free_ratio` of its total chunks, floored at
    /// [`MIN_PAGES_FREE`] pages' worth. Globally: `free_ratio` of the
    /// aggregate page count.
    pub fn refresh(&mut self, deltas: &BTreeMap<u16, ClassDelta>, totals: &Totals) -> FreeBudget {
        self.last_refresh = Some(Instant::now());

        let mut budget = FreeBudget {
            global_pages: (totals.current.total_pages as f64 * self.free_ratio) as u64,
            classes: BTreeMap::new(),
        };

        for (&sid, delta) in deltas {
            let used = delta.curr.used_chunks.unwrap_or(0);
            let free = delta.curr.free_chunks.unwrap_or(0);
            let chunks_per_page = delta.curr.chunks_per_page.unwrap_or(0);

            let hold = ((used + free) as f64 * self.free_ratio) as u64;
            let floor = (chunks_per_page as f64 * MIN_PAGES_FREE) as u64;
            budget.classes.insert(sid, hold.max(floor));
        }

        budget
    }

    /// Forget the last refresh time; the next [`due`](Self::due) check
    /// with page totals passes immediately. Called on reconnect.
    pub fn reset(&mut self) {
        self.last_refresh = None;
    }
}
