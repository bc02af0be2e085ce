//! The per-cycle page-move decision heuristic.
//!
//! Each cycle classifies every slab class's recent behavior over a
//! rolling window (dirty, starved, sitting on excess free chunks) and
//! selects at most one page move: reclaim a page from an over-free
//! class into the global pool, feed a page from the pool to a starved
//! young class, or shift a page from the oldest class toward the
//! youngest. The window smooths single-cycle noise; until it has filled
//! once, the engine refuses to act at all.

use std::collections::BTreeMap;

use crate::budget::FreeBudget;
use crate::history::History;
use crate::stats::{ClassDelta, POOL_CLASS, Snapshot};

/// Pages a class must hold before it can donate to rebalancing.
const MIN_PAGES_FOR_SOURCE: u64 = 2;

/// Free chunks, in pages' worth, beyond which a class is eligible for
/// reclaim into the global pool.
const MIN_PAGES_FOR_RECLAIM: f64 = 2.5;

/// Tuning knobs for the decision heuristic.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Window length W: cycles of history kept and required before acting.
    pub window: usize,
    /// Youngest/oldest average-age ratio that triggers a rebalance.
    pub age_ratio: f64,
    /// Classes with chunks smaller than this many bytes are "small" and
    /// only ever donate pages, never receive them.
    pub small_class_cutoff: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            window: 30,
            age_ratio: 0.8,
            small_class_cutoff: 512,
        }
    }
}

/// A single page move; class 0 is the global pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMove {
    pub src: u16,
    pub dst: u16,
}

impl PageMove {
    /// Whether this move returns a page to the global pool.
    pub fn is_reclaim(&self) -> bool {
        self.dst == POOL_CLASS
    }
}

/// The rolling-window move heuristic. Stateless apart from its config;
/// all cross-cycle state lives in the [`History`] passed in.
#[derive(Debug)]
pub struct DecisionEngine {
    config: EngineConfig,
}

impl DecisionEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Evaluate one cycle.
    ///
    /// Appends exactly one record to `history`, then returns at most
    /// one move. Returns `None` until the window has filled, no matter
    /// what the heuristic would otherwise have chosen.
    pub fn decide(
        &self,
        history: &mut History,
        snapshot: &Snapshot,
        deltas: &BTreeMap<u16, ClassDelta>,
        budget: &FreeBudget,
    ) -> Option<PageMove> {
        history.advance();

        let pool_pages = snapshot.global.free_pool_pages.unwrap_or(0);
        let pool_high = pool_pages > budget.global_pages;
        {
            let record = history.current_mut();
            record.pool_low = pool_pages < budget.global_pages / 2;
            record.pool_high = pool_high;
        }
        // cumulative evidence: one low reading anywhere in the window
        // keeps the pull-from-oldest rule armed
        let pool_low_total = history.pool_low_count();

        let mut decision: Option<PageMove> = None;
        let mut too_free = false;
        let mut oldest: (Option<u16>, f64) = (None, 0.0);
        let mut youngest: (Option<u16>, f64) = (None, f64::INFINITY);

        for (&sid, delta) in deltas {
            let Some(curr) = snapshot.classes.get(&sid) else {
                continue;
            };

            let small = curr
                .chunk_size
                .is_some_and(|size| size < self.config.small_class_cutoff);
            let dirty =
                delta.delta.total_pages.unwrap_or(0) > 0 || delta.delta.evicted.unwrap_or(0) > 0;
            let evicted = delta.delta.evicted.unwrap_or(0) > 0;
            let free_chunks = curr.free_chunks.unwrap_or(0);
            let class_budget = budget.class(sid);
            let free_enough = free_chunks > class_budget;
            let excess_free = class_budget > 0 && free_chunks > 2 * class_budget;

            {
                let obs = history.current_mut().class_mut(sid);
                obs.dirty = dirty;
                obs.evicted = evicted;
                obs.excess_free = excess_free;
                obs.age = curr.age;
            }

            let avg_age = history.avg_age(sid);
            let dirty_count = history.count_class(sid, |obs| obs.dirty);
            let excess_count = history.count_class(sid, |obs| obs.excess_free);

            // reclaim to the global pool: first qualifying class wins
            // and latches for the rest of the cycle
            let chunks_per_page = curr.chunks_per_page.unwrap_or(0);
            if !too_free && free_chunks as f64 > chunks_per_page as f64 * MIN_PAGES_FOR_RECLAIM {
                if small && dirty_count == 0 {
                    decision = Some(PageMove {
                        src: sid,
                        dst: POOL_CLASS,
                    });
                    too_free = true;
                } else if !small && dirty_count == 0 && excess_count == history.len() {
                    decision = Some(PageMove {
                        src: sid,
                        dst: POOL_CLASS,
                    });
                    too_free = true;
                }
            }

            // small classes never participate in oldest/youngest rebalancing
            if small {
                continue;
            }

            let total_pages = curr.total_pages.unwrap_or(0);
            if total_pages > MIN_PAGES_FOR_SOURCE && avg_age > oldest.1 {
                oldest = (Some(sid), avg_age);
            }

            let ever_relaxed = history.count_class(sid, |obs| obs.relaxed) > 0;
            if total_pages > 0
                && excess_count < history.len()
                && !(ever_relaxed && free_enough)
                && avg_age < youngest.1
            {
                youngest = (Some(sid), avg_age);
            }
        }

        if pool_high && let (Some(young), _) = youngest {
            // the pool has more than it needs: relax the youngest class
            // and, if it is actually starved, feed it a page. This may
            // override a reclaim chosen above.
            history.current_mut().class_mut(young).relaxed = true;
            if self.free_chunks(snapshot, young) <= budget.class(young) {
                decision = Some(PageMove {
                    src: POOL_CLASS,
                    dst: young,
                });
            }
        } else if !too_free
            && pool_low_total > 0
            && let (Some(old), _) = oldest
        {
            // the pool ran low at some point in the window: refill it
            // from the class holding the oldest items
            decision = Some(PageMove {
                src: old,
                dst: POOL_CLASS,
            });
        } else if !too_free
            && let (Some(old), old_age) = oldest
            && let (Some(young), young_age) = youngest
            && old != young
            && young_age < old_age * self.config.age_ratio
        {
            history.current_mut().class_mut(young).relaxed = true;
            if self.free_chunks(snapshot, young) <= budget.class(young) {
                decision = Some(PageMove {
                    src: POOL_CLASS,
                    dst: young,
                });
            }
        }

        // warm-up gate: no action on less than a full window of evidence
        if history.len() < self.config.window {
            return None;
        }
        decision
    }

    fn free_chunks(&self, snapshot: &Snapshot, sid: u16) -> u64 {
        snapshot
            .classes
            .get(&sid)
            .and_then(|stats| stats.free_chunks)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::{self, ClassStats, GlobalStats};

    const WINDOW: usize = 30;

    struct Harness {
        engine: DecisionEngine,
        history: History,
        budget: FreeBudget,
        previous: Snapshot,
    }

    impl Harness {
        fn new(budget: FreeBudget) -> Self {
            Self::with_config(
                EngineConfig {
                    window: WINDOW,
                    ..Default::default()
                },
                budget,
            )
        }

        fn with_config(config: EngineConfig, budget: FreeBudget) -> Self {
            Self {
                engine: DecisionEngine::new(config),
                history: History::new(config.window),
                budget,
                previous: Snapshot::default(),
            }
        }

        /// Diff against the previous snapshot and run one decision cycle.
        fn cycle(&mut self, snapshot: Snapshot) -> Option<PageMove> {
            let (deltas, _) = stats::diff(&self.previous, &snapshot);
            let decision =
                self.engine
                    .decide(&mut self.history, &snapshot, &deltas, &self.budget);
            self.previous = snapshot;
            decision
        }
    }

    fn class(chunk_size: u64, free_chunks: u64, total_pages: u64, age: u64) -> ClassStats {
        ClassStats {
            chunk_size: Some(chunk_size),
            chunks_per_page: Some(1000),
            total_pages: Some(total_pages),
            used_chunks: Some(total_pages * 1000 - free_chunks.min(total_pages * 1000)),
            free_chunks: Some(free_chunks),
            evicted: Some(0),
            items: Some(100),
            age: Some(age),
        }
    }

    fn snapshot(pool_pages: u64, classes: &[(u16, ClassStats)]) -> Snapshot {
        Snapshot {
            global: GlobalStats {
                free_pool_pages: Some(pool_pages),
            },
            classes: classes.iter().copied().collect(),
        }
    }

    fn budget(global_pages: u64, classes: &[(u16, u64)]) -> FreeBudget {
        FreeBudget {
            global_pages,
            classes: classes.iter().copied().collect(),
        }
    }

    #[test]
    fn test_warm_up_gate_blocks_early_decisions() {
        // a small class sitting on a mountain of free chunks: the
        // reclaim heuristic wants to fire from the first cycle
        let mut h = Harness::new(budget(10, &[(2, 100)]));
        let snap = snapshot(5, &[(2, class(100, 90_000, 100, 60))]);

        // the history seeds with one record, so the window fills on the
        // 29th cycle here
        for _ in 0..WINDOW - 2 {
            let decision = h.cycle(snap.clone());
            assert_eq!(decision, None, "acted before the window filled");
        }
        let decision = h.cycle(snap);
        assert_eq!(decision, Some(PageMove { src: 2, dst: 0 }));
    }

    #[test]
    fn test_small_class_reclaim_takes_precedence() {
        // class 2 is small and clean with excess free chunks; classes 5
        // and 7 are set up so the age-ratio rule would otherwise move a
        // page. The reclaim latches first and the ratio rule is gated.
        let mut h = Harness::new(budget(10, &[(2, 100), (5, 10_000), (7, 10_000)]));
        let snap = snapshot(
            5,
            &[
                (2, class(100, 90_000, 100, 60)),
                (5, class(1000, 100, 50, 1000)),
                (7, class(1000, 100, 50, 100)),
            ],
        );

        let mut last = None;
        for _ in 0..WINDOW {
            last = h.cycle(snap.clone());
        }
        assert_eq!(last, Some(PageMove { src: 2, dst: 0 }));
    }

    #[test]
    fn test_large_class_reclaim_needs_excess_every_cycle() {
        // large clean class above the reclaim threshold, but its free
        // chunks only exceed twice the budget on some cycles
        let mut h = Harness::new(budget(10, &[(5, 3000)]));
        let excess = snapshot(5, &[(5, class(1000, 7000, 50, 1000))]);
        let modest = snapshot(5, &[(5, class(1000, 5000, 50, 1000))]);

        let mut last = None;
        for i in 0..WINDOW + 3 {
            let snap = if i == 3 { modest.clone() } else { excess.clone() };
            last = h.cycle(snap);
        }
        // the modest cycle is still inside the window
        assert_eq!(last, None);

        for _ in 0..WINDOW {
            last = h.cycle(excess.clone());
        }
        // the modest cycle has rotated out; every record shows excess
        assert_eq!(last, Some(PageMove { src: 5, dst: 0 }));
    }

    #[test]
    fn test_two_class_scenario_reclaims_the_clean_large_class() {
        // id 2 small and dirty, id 5 large, never dirty,
        // free chunks above twice its budget every cycle
        let mut h = Harness::new(budget(0, &[(2, 20_000), (5, 1500)]));
        let mut evicted = 0;

        let mut decisions = Vec::new();
        for _ in 0..WINDOW + 1 {
            evicted += 7;
            let mut small = class(100, 4000, 50, 120);
            small.evicted = Some(evicted);
            let large = class(1000, 5000, 10, 3600);
            decisions.push(h.cycle(snapshot(0, &[(2, small), (5, large)])));
        }

        // nothing until the seed record rotates out of the window
        let (last, warmup) = decisions.split_last().unwrap();
        assert!(warmup.iter().all(Option::is_none));
        assert_eq!(*last, Some(PageMove { src: 5, dst: 0 }));
    }

    #[test]
    fn test_ratio_rule_feeds_starved_youngest() {
        // oldest avg age 100, youngest avg 70, ratio 0.8: 70 < 80, and
        // the youngest is at its budget, so it receives a page
        let mut h = Harness::new(budget(10, &[(5, 200), (7, 200)]));
        let snap = snapshot(
            5,
            &[
                (5, class(1000, 300, 50, 100)),
                (7, class(1000, 200, 50, 70)),
            ],
        );

        let mut last = None;
        for _ in 0..WINDOW {
            last = h.cycle(snap.clone());
        }
        assert_eq!(last, Some(PageMove { src: 0, dst: 7 }));
    }

    #[test]
    fn test_ratio_rule_without_starvation_is_a_no_op() {
        // same ages, but the youngest holds more free chunks than its
        // budget: the rule marks it relaxed and moves nothing
        let mut h = Harness::new(budget(10, &[(5, 200), (7, 200)]));
        let snap = snapshot(
            5,
            &[
                (5, class(1000, 300, 50, 100)),
                (7, class(1000, 250, 50, 70)),
            ],
        );

        let mut last = None;
        for _ in 0..WINDOW {
            last = h.cycle(snap.clone());
        }
        assert_eq!(last, None);
        assert!(h.history.count_class(7, |obs| obs.relaxed) > 0);
    }

    #[test]
    fn test_ratio_rule_requires_age_gap() {
        // 90 is not younger than 100 * 0.8
        let mut h = Harness::new(budget(10, &[(5, 200), (7, 200)]));
        let snap = snapshot(
            5,
            &[
                (5, class(1000, 300, 50, 100)),
                (7, class(1000, 200, 50, 90)),
            ],
        );

        let mut last = None;
        for _ in 0..WINDOW {
            last = h.cycle(snap.clone());
        }
        assert_eq!(last, None);
    }

    #[test]
    fn test_pool_low_cumulative_trigger() {
        // the pool dips below half budget exactly once, early; many
        // cycles later the pull-from-oldest rule still fires on the
        // window evidence even though the current reading is healthy
        let mut h = Harness::new(budget(10, &[(5, 200)]));
        let low = snapshot(4, &[(5, class(1000, 300, 50, 100))]);
        let healthy = snapshot(8, &[(5, class(1000, 300, 50, 100))]);

        h.cycle(healthy.clone());
        h.cycle(low);
        let mut last = None;
        for _ in 0..WINDOW - 2 {
            last = h.cycle(healthy.clone());
        }
        assert_eq!(last, Some(PageMove { src: 5, dst: 0 }));
    }

    #[test]
    fn test_pool_high_feeds_starved_youngest() {
        // pool above its full budget, youngest at its budget: feed it
        let mut h = Harness::new(budget(10, &[(5, 200), (7, 200)]));
        let snap = snapshot(
            20,
            &[
                (5, class(1000, 300, 50, 100)),
                (7, class(1000, 200, 50, 95)),
            ],
        );

        let mut last = None;
        for _ in 0..WINDOW {
            last = h.cycle(snap.clone());
        }
        assert_eq!(last, Some(PageMove { src: 0, dst: 7 }));
        assert!(h.history.count_class(7, |obs| obs.relaxed) > 0);
    }

    #[test]
    fn test_pool_high_overrides_a_latched_reclaim() {
        // a clean small class latches a reclaim, but the pool is high
        // and the starved youngest takes the page instead
        let mut h = Harness::new(budget(10, &[(2, 100), (7, 200)]));
        let snap = snapshot(
            20,
            &[
                (2, class(100, 90_000, 100, 60)),
                (7, class(1000, 200, 50, 95)),
            ],
        );

        let mut last = None;
        for _ in 0..WINDOW {
            last = h.cycle(snap.clone());
        }
        assert_eq!(last, Some(PageMove { src: 0, dst: 7 }));
    }

    #[test]
    fn test_relaxed_and_free_enough_excluded_from_youngest() {
        // the youngest class keeps getting relaxed by the ratio rule
        // while holding more than its budget; once both hold, it stops
        // qualifying as youngest and the rule falls silent
        let mut h = Harness::new(budget(10, &[(5, 200), (7, 100)]));
        let snap = snapshot(
            5,
            &[
                (5, class(1000, 300, 50, 100)),
                (7, class(1000, 150, 50, 70)),
            ],
        );

        let mut last = None;
        for _ in 0..WINDOW + 5 {
            last = h.cycle(snap.clone());
        }
        // relaxed on an earlier cycle + currently free_enough
        assert_eq!(last, None);
    }

    #[test]
    fn test_classes_without_deltas_are_ignored() {
        // first cycle after connect: empty previous snapshot, so no
        // class has a delta and nothing is classified
        let mut h = Harness::new(budget(10, &[(2, 100)]));
        let decision = h.cycle(snapshot(5, &[(2, class(100, 90_000, 100, 60))]));
        assert_eq!(decision, None);
        assert!(h.history.current().class(2).is_none());
    }
}
