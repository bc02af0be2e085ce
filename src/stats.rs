//! Typed statistics snapshots and snapshot differencing.
//!
//! Counters are modeled as named optional fields rather than string
//! maps: a counter the server did not report this cycle is `None`,
//! which keeps "missing" distinct from zero when diffing.

use std::collections::BTreeMap;

/// Class id of the global free-page pool. Never a per-item-size class.
pub const POOL_CLASS: u16 = 0;

/// Per-class counters as of one snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassStats {
    pub chunk_size: Option<u64>,
    pub chunks_per_page: Option<u64>,
    pub total_pages: Option<u64>,
    pub used_chunks: Option<u64>,
    pub free_chunks: Option<u64>,
    pub evicted: Option<u64>,
    pub items: Option<u64>,
    pub age: Option<u64>,
}

impl ClassStats {
    /// Fold one named counter into the record.
    ///
    /// Unknown keys and non-numeric values are ignored.
    pub fn record(&mut self, key: &str, value: &str) {
        let Ok(value) = value.parse::<u64>() else {
            return;
        };
        match key {
            "chunk_size" => self.chunk_size = Some(value),
            "chunks_per_page" => self.chunks_per_page = Some(value),
            "total_pages" => self.total_pages = Some(value),
            "used_chunks" => self.used_chunks = Some(value),
            "free_chunks" => self.free_chunks = Some(value),
            "evicted" => self.evicted = Some(value),
            "number" => self.items = Some(value),
            "age" => self.age = Some(value),
            _ => {}
        }
    }
}

/// Server-global counters from the plain `stats` snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalStats {
    /// Pages currently sitting in the global free-page pool.
    pub free_pool_pages: Option<u64>,
}

impl GlobalStats {
    /// Fold one named global counter into the record.
    pub fn record(&mut self, key: &str, value: &str) {
        let Ok(value) = value.parse::<u64>() else {
            return;
        };
        if key == "slab_global_page_pool" {
            self.free_pool_pages = Some(value);
        }
    }
}

/// One complete observation of the managed server.
///
/// Classes are keyed by id in a `BTreeMap` so every per-class pass runs
/// in ascending class order.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub global: GlobalStats,
    pub classes: BTreeMap<u16, ClassStats>,
}

/// Signed per-counter movement between two snapshots of one class.
///
/// A field is `None` when the counter was missing from either side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDeltas {
    pub chunk_size: Option<i64>,
    pub chunks_per_page: Option<i64>,
    pub total_pages: Option<i64>,
    pub used_chunks: Option<i64>,
    pub free_chunks: Option<i64>,
    pub evicted: Option<i64>,
    pub items: Option<i64>,
    pub age: Option<i64>,
}

/// Previous and current absolute values plus per-counter deltas for a
/// class present in two consecutive snapshots.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassDelta {
    pub prev: ClassStats,
    pub curr: ClassStats,
    pub delta: CounterDeltas,
}

/// Sums of current counter values across all classes with a delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSums {
    pub chunk_size: u64,
    pub chunks_per_page: u64,
    pub total_pages: u64,
    pub used_chunks: u64,
    pub free_chunks: u64,
    pub evicted: u64,
    pub items: u64,
    pub age: u64,
}

/// Sums of counter deltas across all classes with a delta.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaSums {
    pub chunk_size: i64,
    pub chunks_per_page: i64,
    pub total_pages: i64,
    pub used_chunks: i64,
    pub free_chunks: i64,
    pub evicted: i64,
    pub items: i64,
    pub age: i64,
}

/// Aggregate view of one cycle's diff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub current: CounterSums,
    pub delta: DeltaSums,
}

fn diff_counter(prev: Option<u64>, curr: Option<u64>) -> Option<i64> {
    match (prev, curr) {
        (Some(p), Some(c)) => Some(c as i64 - p as i64),
        _ => None,
    }
}

fn delta_counters(prev: &ClassStats, curr: &ClassStats) -> CounterDeltas {
    CounterDeltas {
        chunk_size: diff_counter(prev.chunk_size, curr.chunk_size),
        chunks_per_page: diff_counter(prev.chunks_per_page, curr.chunks_per_page),
        total_pages: diff_counter(prev.total_pages, curr.total_pages),
        used_chunks: diff_counter(prev.used_chunks, curr.used_chunks),
        free_chunks: diff_counter(prev.free_chunks, curr.free_chunks),
        evicted: diff_counter(prev.evicted, curr.evicted),
        items: diff_counter(prev.items, curr.items),
        age: diff_counter(prev.age, curr.age),
    }
}

fn accumulate(totals: &mut Totals, curr: &ClassStats, delta: &CounterDeltas) {
    totals.current.chunk_size += curr.chunk_size.unwrap_or(0);
    totals.current.chunks_per_page += curr.chunks_per_page.unwrap_or(0);
    totals.current.total_pages += curr.total_pages.unwrap_or(0);
    totals.current.used_chunks += curr.used_chunks.unwrap_or(0);
    totals.current.free_chunks += curr.free_chunks.unwrap_or(0);
    totals.current.evicted += curr.evicted.unwrap_or(0);
    totals.current.items += curr.items.unwrap_or(0);
    totals.current.age += curr.age.unwrap_or(0);

    totals.delta.chunk_size += delta.chunk_size.unwrap_or(0);
    totals.delta.chunks_per_page += delta.chunks_per_page.unwrap_or(0);
    totals.delta.total_pages += delta.total_pages.unwrap_or(0);
    totals.delta.used_chunks += delta.used_chunks.unwrap_or(0);
    totals.delta.free_chunks += delta.free_chunks.unwrap_or(0);
    totals.delta.evicted += delta.evicted.unwrap_or(0);
    totals.delta.items += delta.items.unwrap_or(0);
    totals.delta.age += delta.age.unwrap_or(0);
}

/// Compute per-class deltas and aggregate totals between consecutive
/// snapshots.
///
/// A class absent from `before` is skipped entirely: it has no delta to
/// evaluate this cycle. This is the normal state of the first cycle
/// after (re)connect, when `before` is empty.
pub fn diff(before: &Snapshot, after: &Snapshot) -> (BTreeMap<u16, ClassDelta>, Totals) {
    let mut deltas = BTreeMap::new();
    let mut totals = Totals::default();

    for (&sid, curr) in &after.classes {
        let Some(prev) = before.classes.get(&sid) else {
            continue;
        };
        let delta = delta_counters(prev, curr);
        accumulate(&mut totals, curr, &delta);
        deltas.insert(
            sid,
            ClassDelta {
                prev: *prev,
                curr: *curr,
                delta,
            },
        );
    }

    (deltas, totals)
}

/// Percentage of `num` over `den`; a zero denominator reads as zero.
pub fn pct(num: u64, den: u64) -> f64 {
    if den == 0 {
        return 0.0;
    }
    num as f64 / den as f64 * 100.0
}
