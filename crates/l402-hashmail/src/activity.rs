use crate::mailbox::StreamId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use std::time::Instant;

/// Classification produced by one sweep of the activity tracker (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    InUse,
    Standby,
}

struct Counter {
    reads: u64,
    last_nonzero_sweep: Instant,
}

/// Counts successful reads on the "odd" side of each bidirectional stream
/// pair, keyed by the pair's base id (the id with its low bit cleared).
/// Every sweep classifies and resets each counter; entries idle for more
/// than 24 hours with no reads since the prior sweep are pruned.
pub struct ActivityTracker {
    counters: Mutex<HashMap<StreamId, Counter>>,
}

const PRUNE_AFTER: Duration = Duration::from_secs(24 * 60 * 60);

pub fn base_id(id: &StreamId) -> StreamId {
    let mut base = *id;
    let last = base.len() - 1;
    base[last] &= !1;
    base
}

pub fn is_odd_side(id: &StreamId) -> bool {
    id[id.len() - 1] & 1 == 1
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
        }
    }

    /// Records one successful read on `stream_id`; a no-op unless it is the
    /// odd side of its pair.
    pub fn record_read(&self, stream_id: &StreamId) {
        if !is_odd_side(stream_id) {
            return;
        }
        let base = base_id(stream_id);
        let mut counters = self.counters.lock();
        let entry = counters.entry(base).or_insert_with(|| Counter {
            reads: 0,
            last_nonzero_sweep: Instant::now(),
        });
        entry.reads += 1;
    }

    /// Classifies every tracked base id by its read rate over `elapsed`,
    /// prunes entries idle past 24h with no reads since their last sweep,
    /// and resets every surviving counter to zero.
    pub fn sweep(&self, elapsed: Duration) -> Vec<(StreamId, Activity)> {
        let now = Instant::now();
        let mut counters = self.counters.lock();
        let mut out = Vec::new();
        counters.retain(|_, counter| {
            if counter.reads == 0 && now.duration_since(counter.last_nonzero_sweep) > PRUNE_AFTER {
                return false;
            }
            true
        });

        for (id, counter) in counters.iter_mut() {
            let rate = counter.reads as f64 / elapsed.as_secs_f64().max(f64::MIN_POSITIVE);
            let activity = if rate >= 0.5 {
                Activity::InUse
            } else {
                Activity::Standby
            };
            out.push((*id, activity));
            if counter.reads > 0 {
                counter.last_nonzero_sweep = now;
            }
            counter.reads = 0;
        }
        out
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream_id(byte: u8, odd: bool) -> StreamId {
        let mut id = [byte; 64];
        let last = id.len() - 1;
        id[last] = if odd { 1 } else { 0 };
        id
    }

    #[test]
    fn even_side_reads_are_not_counted() {
        let tracker = ActivityTracker::new();
        tracker.record_read(&stream_id(1, false));
        let results = tracker.sweep(Duration::from_secs(1));
        assert!(results.is_empty());
    }

    #[test]
    fn high_rate_classifies_as_in_use() {
        let tracker = ActivityTracker::new();
        for _ in 0..10 {
            tracker.record_read(&stream_id(2, true));
        }
        let results = tracker.sweep(Duration::from_secs(1));
        assert_eq!(results, vec![(base_id(&stream_id(2, true)), Activity::InUse)]);
    }

    #[test]
    fn low_rate_classifies_as_standby() {
        let tracker = ActivityTracker::new();
        tracker.record_read(&stream_id(3, true));
        let results = tracker.sweep(Duration::from_secs(10));
        assert_eq!(
            results,
            vec![(base_id(&stream_id(3, true)), Activity::Standby)]
        );
    }

    #[test]
    fn counters_reset_after_each_sweep() {
        let tracker = ActivityTracker::new();
        tracker.record_read(&stream_id(4, true));
        tracker.sweep(Duration::from_secs(1));
        let results = tracker.sweep(Duration::from_secs(1));
        assert!(results.is_empty() || results[0].1 == Activity::Standby);
    }
}
