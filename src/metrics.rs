//! Controller metrics.

use metriken::{Counter, metric};

#[metric(name = "cycles", description = "Decision cycles completed")]
pub static CYCLES: Counter = Counter::new();

#[metric(name = "decisions", description = "Cycles that selected a page move")]
pub static DECISIONS: Counter = Counter::new();

#[metric(
    name = "reclaims",
    description = "Decisions returning a page to the global pool"
)]
pub static RECLAIMS: Counter = Counter::new();

#[metric(name = "moves", description = "Reassign commands issued")]
pub static MOVES: Counter = Counter::new();

#[metric(
    name = "budget_refreshes",
    description = "Free-budget recomputations pushed to the server"
)]
pub static BUDGET_REFRESHES: Counter = Counter::new();

#[metric(name = "connects", description = "Connections established")]
pub static CONNECTS: Counter = Counter::new();

#[metric(name = "connect_failures", description = "Connection attempts that failed")]
pub static CONNECT_FAILURES: Counter = Counter::new();

#[metric(
    name = "disconnects",
    description = "Connections lost mid-cycle, forcing a state reset"
)]
pub static DISCONNECTS: Counter = Counter::new();
