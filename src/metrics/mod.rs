//! Per-collection cache and traffic statistics.
//!
//! The recorder is best-effort observability: recording is plain counter
//! arithmetic that cannot fail and must never alter the outcome of the data
//! operation it annotates.

pub mod aggregation;

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use self::aggregation::{TimeStats, TimeStatsSnapshot};

/// Counters for one collection, created lazily on first access.
#[derive(Debug)]
struct CollectionStats {
    hits: u64,
    misses: u64,
    invalidations: u64,
    total_reads: u64,
    total_writes: u64,
    bytes_served_from_cache: u64,
    bytes_served_from_db: u64,
    bytes_invalidated: u64,
    total_read_bytes: u64,
    total_write_bytes: u64,
    time_stats: TimeStats,
}

impl CollectionStats {
    fn new(interval_secs: u64) -> Self {
        Self {
            hits: 0,
            misses: 0,
            invalidations: 0,
            total_reads: 0,
            total_writes: 0,
            bytes_served_from_cache: 0,
            bytes_served_from_db: 0,
            bytes_invalidated: 0,
            total_read_bytes: 0,
            total_write_bytes: 0,
            time_stats: TimeStats::new(interval_secs),
        }
    }

    fn snapshot(&self) -> CollectionSnapshot {
        let total_bytes_served = self.bytes_served_from_cache + self.bytes_served_from_db;
        CollectionSnapshot {
            hits: self.hits,
            misses: self.misses,
            hit_rate: percentage(self.hits, self.hits + self.misses),
            invalidations: self.invalidations,
            bytes_served_from_cache: self.bytes_served_from_cache,
            bytes_served_from_db: self.bytes_served_from_db,
            bytes_invalidated: self.bytes_invalidated,
            total_bytes_served,
            cache_efficiency: percentage(self.bytes_served_from_cache, total_bytes_served),
            total_reads: self.total_reads,
            total_writes: self.total_writes,
            total_read_bytes: self.total_read_bytes,
            total_write_bytes: self.total_write_bytes,
            average_read_size: ratio(self.total_read_bytes, self.total_reads),
            average_write_size: ratio(self.total_write_bytes, self.total_writes),
            time_stats: self.time_stats.snapshot(),
        }
    }
}

/// `num / den`, 0 when the denominator is 0 (never NaN).
fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn percentage(num: u64, den: u64) -> f64 {
    ratio(num, den) * 100.0
}

/// Best-effort recorder of per-collection traffic statistics.
#[derive(Debug)]
pub struct StatsRecorder {
    interval_secs: u64,
    collections: HashMap<String, CollectionStats>,
}

impl StatsRecorder {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs,
            collections: HashMap::new(),
        }
    }

    fn entry(&mut self, collection: &str) -> &mut CollectionStats {
        self.collections
            .entry(collection.to_string())
            .or_insert_with(|| CollectionStats::new(self.interval_secs))
    }

    /// A read served from the cache.
    pub fn record_hit(&mut self, collection: &str, bytes: u64) {
        let stats = self.entry(collection);
        stats.hits += 1;
        stats.total_reads += 1;
        stats.total_read_bytes += bytes;
        stats.bytes_served_from_cache += bytes;
        stats.time_stats.record(bytes);
    }

    /// A read that went to the backend.
    pub fn record_miss(&mut self, collection: &str, bytes: u64) {
        let stats = self.entry(collection);
        stats.misses += 1;
        stats.total_reads += 1;
        stats.total_read_bytes += bytes;
        stats.bytes_served_from_db += bytes;
        stats.time_stats.record(bytes);
    }

    /// A write forwarded to the backend.
    pub fn record_write(&mut self, collection: &str, bytes: u64) {
        let stats = self.entry(collection);
        stats.total_writes += 1;
        stats.total_write_bytes += bytes;
        stats.time_stats.record(bytes);
    }

    /// Cache entries dropped by an invalidation.
    pub fn record_invalidation(&mut self, collection: &str, entries: u64, bytes: u64) {
        let stats = self.entry(collection);
        stats.invalidations += entries;
        stats.bytes_invalidated += bytes;
    }

    pub fn clear(&mut self) {
        self.collections.clear();
    }

    pub fn snapshot(&self) -> BTreeMap<String, CollectionSnapshot> {
        self.collections
            .iter()
            .map(|(name, stats)| (name.clone(), stats.snapshot()))
            .collect()
    }
}

/// Per-collection statistics as exposed to operators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSnapshot {
    pub hits: u64,
    pub misses: u64,
    /// Percent of reads served from the cache.
    pub hit_rate: f64,
    pub invalidations: u64,
    pub bytes_served_from_cache: u64,
    pub bytes_served_from_db: u64,
    pub bytes_invalidated: u64,
    pub total_bytes_served: u64,
    /// Percent of served bytes that came from the cache.
    pub cache_efficiency: f64,
    pub total_reads: u64,
    pub total_writes: u64,
    pub total_read_bytes: u64,
    pub total_write_bytes: u64,
    pub average_read_size: f64,
    pub average_write_size: f64,
    pub time_stats: TimeStatsSnapshot,
}

/// Whole-cache occupancy.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSnapshot {
    pub entries: usize,
    pub current_size: usize,
    pub max_size: usize,
    /// Percent of the byte budget in use.
    pub utilization: f64,
}

/// The full statistics surface returned by `cache_stats`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsSnapshot {
    pub overall: OverallSnapshot,
    pub collections: BTreeMap<String, CollectionSnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_state_rates_are_zero_not_nan() {
        let mut recorder = StatsRecorder::new(900);
        // Touch a collection without any reads or writes.
        recorder.record_invalidation("rooms", 0, 0);
        let snapshot = recorder.snapshot();
        let rooms = &snapshot["rooms"];
        assert_eq!(rooms.hit_rate, 0.0);
        assert_eq!(rooms.cache_efficiency, 0.0);
        assert_eq!(rooms.average_read_size, 0.0);
        assert_eq!(rooms.average_write_size, 0.0);
    }

    #[test]
    fn hit_and_miss_accounting() {
        let mut recorder = StatsRecorder::new(900);
        recorder.record_miss("rooms", 100);
        recorder.record_hit("rooms", 100);
        recorder.record_hit("rooms", 100);
        recorder.record_write("rooms", 40);
        let snapshot = recorder.snapshot();
        let rooms = &snapshot["rooms"];
        assert_eq!(rooms.hits, 2);
        assert_eq!(rooms.misses, 1);
        assert_eq!(rooms.total_reads, 3);
        assert_eq!(rooms.total_read_bytes, 300);
        assert_eq!(rooms.bytes_served_from_cache, 200);
        assert_eq!(rooms.bytes_served_from_db, 100);
        assert_eq!(rooms.total_bytes_served, 300);
        assert!((rooms.hit_rate - 66.666).abs() < 0.01);
        assert!((rooms.cache_efficiency - 66.666).abs() < 0.01);
        assert_eq!(rooms.average_read_size, 100.0);
        assert_eq!(rooms.total_writes, 1);
        assert_eq!(rooms.average_write_size, 40.0);
    }

    #[test]
    fn collections_are_tracked_independently() {
        let mut recorder = StatsRecorder::new(900);
        recorder.record_miss("rooms", 10);
        recorder.record_write("users", 20);
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["rooms"].total_reads, 1);
        assert_eq!(snapshot["rooms"].total_writes, 0);
        assert_eq!(snapshot["users"].total_writes, 1);
    }
}
