use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for the arbitration service. Updated without taking the service lock.
#[derive(Debug, Default)]
pub struct ArbiterStats {
    locks: AtomicU64,
    handovers: AtomicU64,
    fast_flushes: AtomicU64,
    slow_flushes: AtomicU64,
    flush_timeouts: AtomicU64,
    cache_flush_timeouts: AtomicU64,
    power_ups: AtomicU64,
    power_downs: AtomicU64,
}

impl ArbiterStats {
    pub fn inc_locks(&self) {
        self.locks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handovers(&self) {
        self.handovers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_fast_flushes(&self) {
        self.fast_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_slow_flushes(&self) {
        self.slow_flushes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_flush_timeouts(&self) {
        self.flush_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_cache_flush_timeouts(&self) {
        self.cache_flush_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_power_ups(&self) {
        self.power_ups.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_power_downs(&self) {
        self.power_downs.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ArbiterStatsSnapshot {
        ArbiterStatsSnapshot {
            locks: self.locks.load(Ordering::Relaxed),
            handovers: self.handovers.load(Ordering::Relaxed),
            fast_flushes: self.fast_flushes.load(Ordering::Relaxed),
            slow_flushes: self.slow_flushes.load(Ordering::Relaxed),
            flush_timeouts: self.flush_timeouts.load(Ordering::Relaxed),
            cache_flush_timeouts: self.cache_flush_timeouts.load(Ordering::Relaxed),
            power_ups: self.power_ups.load(Ordering::Relaxed),
            power_downs: self.power_downs.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ArbiterStatsSnapshot {
    pub locks: u64,
    pub handovers: u64,
    pub fast_flushes: u64,
    pub slow_flushes: u64,
    pub flush_timeouts: u64,
    pub cache_flush_timeouts: u64,
    pub power_ups: u64,
    pub power_downs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_serializes_every_counter() {
        let stats = ArbiterStats::default();
        stats.inc_locks();
        stats.inc_locks();
        stats.inc_handovers();
        stats.inc_flush_timeouts();

        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["locks"], 2);
        assert_eq!(json["handovers"], 1);
        assert_eq!(json["flush_timeouts"], 1);
        assert_eq!(json["power_downs"], 0);
        assert_eq!(json.as_object().unwrap().len(), 8);
    }
}
