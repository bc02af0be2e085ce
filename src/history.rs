//! Rolling window of per-cycle observations.
//!
//! The decision heuristic never acts on a single cycle's reading; it
//! smooths over the last W cycles of flags kept here.

use std::collections::{BTreeMap, VecDeque};

/// Flags recorded for one class during one decision cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClassObservation {
    pub dirty: bool,
    pub evicted: bool,
    pub excess_free: bool,
    pub relaxed: bool,
    pub age: Option<u64>,
}

/// One cycle's worth of observations.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub pool_low: bool,
    pub pool_high: bool,
    classes: BTreeMap<u16, ClassObservation>,
}

impl Observation {
    /// The recorded sub-record for a class, if this cycle saw it.
    pub fn class(&self, sid: u16) -> Option<&ClassObservation> {
        self.classes.get(&sid)
    }

    /// The sub-record for a class, created empty on first touch.
    pub fn class_mut(&mut self, sid: u16) -> &mut ClassObservation {
        self.classes.entry(sid).or_default()
    }
}

/// Fixed-capacity FIFO of the most recent observations.
///
/// Always holds between 1 and `window` records: a fresh history starts
/// with a single empty record, and appending beyond capacity evicts the
/// oldest record.
#[derive(Debug, Clone)]
pub struct History {
    window: usize,
    records: VecDeque<Observation>,
}

impl History {
    pub fn new(window: usize) -> Self {
        let mut records = VecDeque::with_capacity(window + 1);
        records.push_back(Observation::default());
        Self { window, records }
    }

    /// Configured window size W.
    pub fn window(&self) -> usize {
        self.window
    }

    /// Number of records currently held, in [1, W].
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Start a new cycle record, evicting the oldest beyond capacity.
    pub fn advance(&mut self) {
        self.records.push_back(Observation::default());
        if self.records.len() > self.window {
            self.records.pop_front();
        }
    }

    /// The record for the cycle in progress.
    pub fn current(&self) -> &Observation {
        self.records.back().expect("history is never empty")
    }

    /// Mutable access to the record for the cycle in progress.
    pub fn current_mut(&mut self) -> &mut Observation {
        self.records.back_mut().expect("history is never empty")
    }

    /// Cycles in the window that saw the global pool run low.
    pub fn pool_low_count(&self) -> usize {
        self.records.iter().filter(|r| r.pool_low).count()
    }

    /// Cycles in the window where `flag` held for the class.
    ///
    /// Records without a sub-record for the class count as false.
    pub fn count_class<F>(&self, sid: u16, flag: F) -> usize
    where
        F: Fn(&ClassObservation) -> bool,
    {
        self.records
            .iter()
            .filter_map(|r| r.class(sid))
            .filter(|obs| flag(obs))
            .count()
    }

    /// Window-average age for a class.
    ///
    /// Ages are summed over the records that recorded one, but averaged
    /// over the full window length, so sparse readings pull the average
    /// down rather than inflating it.
    pub fn avg_age(&self, sid: u16) -> f64 {
        let sum: u64 = self
            .records
            .iter()
            .filter_map(|r| r.class(sid))
            .filter_map(|obs| obs.age)
            .sum();
        sum as f64 / self.records.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_with_one_empty_record() {
        let history = History::new(30);
        assert_eq!(history.len(), 1);
        assert!(!history.current().pool_low);
        assert!(history.current().class(1).is_none());
    }

    #[test]
    fn test_window_bound() {
        let mut history = History::new(5);
        for _ in 0..100 {
            history.advance();
            assert!(history.len() >= 1);
            assert!(history.len() <= 5);
        }
        assert_eq!(history.len(), 5);
    }

    #[test]
    fn test_strict_fifo_eviction() {
        let mut history = History::new(3);
        history.current_mut().pool_low = true;
        history.advance();
        history.advance();
        assert_eq!(history.pool_low_count(), 1);
        // the seed record is the oldest; one more advance drops it
        history.advance();
        assert_eq!(history.pool_low_count(), 0);
    }

    #[test]
    fn test_count_class_ignores_missing_subrecords() {
        let mut history = History::new(4);
        history.current_mut().class_mut(5).dirty = true;
        history.advance();
        // this cycle never touches class 5
        history.advance();
        history.current_mut().class_mut(5).dirty = true;
        assert_eq!(history.count_class(5, |obs| obs.dirty), 2);
        assert_eq!(history.count_class(5, |obs| obs.excess_free), 0);
        assert_eq!(history.count_class(9, |obs| obs.dirty), 0);
    }

    #[test]
    fn test_avg_age_uses_window_length_denominator() {
        let mut history = History::new(10);
        history.current_mut().class_mut(2).age = Some(100);
        history.advance();
        history.current_mut().class_mut(2).age = Some(200);
        // 2 readings over 2 records
        assert_eq!(history.avg_age(2), 150.0);
        history.advance();
        // 2 readings over 3 records
        assert_eq!(history.avg_age(2), 100.0);
        // class never seen: average is zero, not NaN
        assert_eq!(history.avg_age(7), 0.0);
    }
}
