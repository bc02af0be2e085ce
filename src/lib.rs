//! Slab page rebalancer sidecar for memcache-style cache servers.
//!
//! Connects to a cache server's admin port, polls per-class slab and
//! item statistics, and decides each cycle whether to move one
//! fixed-size memory page between size classes or the global free-page
//! pool. Decisions come from a rolling-window heuristic that tracks
//! which classes are dirty (growing or evicting), starved, or sitting
//! on excess free chunks, so a single noisy cycle never causes a move
//! and pages never flap between classes.
//!
//! The pieces, leaf first: [`stats`] diffs consecutive snapshots,
//! [`budget`] derives free-chunk reserve targets, [`history`] keeps the
//! rolling window, [`engine`] makes the per-cycle decision, and
//! [`control`] drives the connect → observe → decide → act loop with
//! reconnect-and-reset on any failure.

pub mod budget;
pub mod config;
pub mod connection;
pub mod control;
pub mod engine;
pub mod history;
pub mod metrics;
pub mod protocol;
pub mod stats;
