//! The connect → observe → decide → act control loop.
//!
//! A single thread drives everything: snapshots are strictly
//! sequential, so every diff is computed against the immediately
//! preceding snapshot. Transport failures are never fatal; the loop
//! resets its per-connection state and retries forever.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use tracing::{debug, info, warn};

use crate::budget::{BudgetEstimator, FreeBudget};
use crate::config::ControllerConfig;
use crate::connection::{Connection, ConnectionError};
use crate::engine::{DecisionEngine, PageMove};
use crate::history::History;
use crate::metrics;
use crate::stats::{self, Snapshot};

/// Mutable state carried across the cycles of one connection.
///
/// Rebuilt from scratch on every (re)connect so the controller never
/// acts on evidence that straddles a connection loss.
pub struct CycleState {
    pub history: History,
    pub budget: FreeBudget,
    pub previous: Snapshot,
}

impl CycleState {
    pub fn new(window: usize) -> Self {
        Self {
            history: History::new(window),
            budget: FreeBudget::default(),
            previous: Snapshot::default(),
        }
    }
}

/// What one connected cycle produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleOutcome {
    pub decision: Option<PageMove>,
    /// Whether a reassign command was actually issued.
    pub moved: bool,
}

/// The sidecar controller: owns the heuristic and the budget estimator,
/// borrows a connection for as long as one lasts.
pub struct Controller {
    config: ControllerConfig,
    engine: DecisionEngine,
    estimator: BudgetEstimator,
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        let engine = DecisionEngine::new(config.engine);
        let estimator = BudgetEstimator::new(config.free_ratio, config.budget_interval);
        Self {
            config,
            engine,
            estimator,
        }
    }

    /// Run until `running` clears. Reconnects with a fixed backoff on
    /// any failure; never exits on its own due to connectivity loss.
    pub fn run(&mut self, running: &AtomicBool) {
        while running.load(Ordering::SeqCst) {
            let mut conn =
                match Connection::connect(&self.config.server, self.config.connect_timeout) {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(server = %self.config.server, error = %e, "connect failed");
                        metrics::CONNECT_FAILURES.increment();
                        thread::sleep(self.config.retry_pause);
                        continue;
                    }
                };
            info!(server = %self.config.server, "connected");
            metrics::CONNECTS.increment();

            let mut state = CycleState::new(self.config.engine.window);
            self.estimator.reset();

            if let Err(e) = self.run_connected(&mut conn, &mut state, running) {
                warn!(error = %e, "connection lost, resetting state");
                metrics::DISCONNECTS.increment();
                thread::sleep(self.config.retry_pause);
            }
        }
    }

    fn run_connected(
        &mut self,
        conn: &mut Connection,
        state: &mut CycleState,
        running: &AtomicBool,
    ) -> Result<(), ConnectionError> {
        while running.load(Ordering::SeqCst) {
            let outcome = self.cycle(conn, state)?;

            // a reclaim means pages are coming free in bursts: loop
            // again immediately. Everything else, including cycles that
            // computed no decision at all, paces normally.
            let reclaimed = outcome.decision.is_some_and(|mv| mv.is_reclaim());
            if !reclaimed {
                thread::sleep(self.config.cycle_pause);
            }
        }
        Ok(())
    }

    /// One full observe → diff → budget → decide → act pass.
    pub fn cycle(
        &mut self,
        conn: &mut Connection,
        state: &mut CycleState,
    ) -> Result<CycleOutcome, ConnectionError> {
        let snapshot = conn.fetch_snapshot()?;
        let (deltas, totals) = stats::diff(&state.previous, &snapshot);
        metrics::CYCLES.increment();
        debug!(
            classes = deltas.len(),
            evicted_delta = totals.delta.evicted,
            pool_pages = snapshot.global.free_pool_pages.unwrap_or(0),
            "cycle"
        );

        let mut decision = None;
        if totals.delta.evicted > 0 {
            if self.estimator.due(&totals) {
                state.budget = self.estimator.refresh(&deltas, &totals);
                metrics::BUDGET_REFRESHES.increment();
                debug!(
                    global_pages = state.budget.global_pages,
                    classes = state.budget.classes.len(),
                    "free budget refreshed"
                );
                for (&sid, &chunks) in &state.budget.classes {
                    conn.set_free_target(sid, chunks)?;
                }
            }

            decision = self
                .engine
                .decide(&mut state.history, &snapshot, &deltas, &state.budget);
        }

        let mut moved = false;
        if let Some(mv) = decision {
            metrics::DECISIONS.increment();
            if mv.is_reclaim() {
                metrics::RECLAIMS.increment();
            }
            let fullness = snapshot
                .classes
                .get(&mv.src)
                .map(|class| {
                    let used = class.used_chunks.unwrap_or(0);
                    stats::pct(used, used + class.free_chunks.unwrap_or(0))
                })
                .unwrap_or(0.0);
            info!(
                src = mv.src,
                dst = mv.dst,
                src_fullness_pct = fullness,
                automove = self.config.automove,
                "page move selected"
            );
            if self.config.automove {
                conn.reassign(mv.src, mv.dst)?;
                metrics::MOVES.increment();
                moved = true;
            }
        }

        state.previous = snapshot;
        Ok(CycleOutcome { decision, moved })
    }
}
