//! Multi-resolution traffic accumulation.
//!
//! Byte volumes of read and write events are folded into three retained
//! resolutions: rolling interval buckets (24 hours kept), calendar days
//! with per-hour sub-totals (30 days kept) and Monday-aligned weeks
//! (12 weeks kept). Buckets are created on first record and pruned lazily
//! inside [`TimeStats::record`]; there is no background task.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;

/// Byte and operation totals for one bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub bytes: u64,
    pub count: u64,
}

impl Bucket {
    fn record(&mut self, bytes: u64) {
        self.bytes += bytes;
        self.count += 1;
    }
}

/// One calendar day: a running total plus 24 per-hour sub-totals.
#[derive(Debug, Clone)]
struct DayBucket {
    total: Bucket,
    hourly: [Bucket; 24],
}

impl Default for DayBucket {
    fn default() -> Self {
        Self {
            total: Bucket::default(),
            hourly: [Bucket::default(); 24],
        }
    }
}

const INTERVAL_RETENTION_SECS: i64 = 24 * 60 * 60;
const DAILY_RETENTION: usize = 30;
const WEEKLY_RETENTION: usize = 12;

/// Rolling, daily and weekly traffic accumulator for one collection.
#[derive(Debug)]
pub struct TimeStats {
    interval_secs: i64,
    /// Keyed by `floor(epoch / interval_secs)`.
    intervals: BTreeMap<i64, Bucket>,
    /// Keyed by `YYYY-MM-DD`, which sorts chronologically.
    daily: BTreeMap<String, DayBucket>,
    /// Keyed by the Monday-aligned week start date.
    weekly: BTreeMap<String, Bucket>,
}

impl TimeStats {
    pub fn new(interval_secs: u64) -> Self {
        Self {
            interval_secs: interval_secs.max(1) as i64,
            intervals: BTreeMap::new(),
            daily: BTreeMap::new(),
            weekly: BTreeMap::new(),
        }
    }

    /// Fold one event of `bytes` into every resolution.
    pub fn record(&mut self, bytes: u64) {
        self.record_at(Utc::now(), bytes);
    }

    pub(crate) fn record_at(&mut self, now: DateTime<Utc>, bytes: u64) {
        let epoch = now.timestamp();

        let key = epoch.div_euclid(self.interval_secs);
        self.intervals.entry(key).or_default().record(bytes);
        let cutoff = (epoch - INTERVAL_RETENTION_SECS).div_euclid(self.interval_secs);
        let retained = self.intervals.split_off(&cutoff);
        self.intervals = retained;

        let date = now.date_naive();
        let day = self
            .daily
            .entry(date.format("%Y-%m-%d").to_string())
            .or_default();
        day.total.record(bytes);
        day.hourly[now.hour() as usize].record(bytes);
        while self.daily.len() > DAILY_RETENTION {
            self.daily.pop_first();
        }

        let week_start = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
        self.weekly
            .entry(week_start.format("%Y-%m-%d").to_string())
            .or_default()
            .record(bytes);
        while self.weekly.len() > WEEKLY_RETENTION {
            self.weekly.pop_first();
        }
    }

    pub fn snapshot(&self) -> TimeStatsSnapshot {
        let width = self.interval_secs as f64;
        let intervals: Vec<IntervalSnapshot> = self
            .intervals
            .iter()
            .rev()
            .map(|(key, bucket)| IntervalSnapshot {
                timestamp: key * self.interval_secs,
                bytes: bucket.bytes,
                count: bucket.count,
                bytes_per_second: bucket.bytes as f64 / width,
            })
            .collect();

        let current = intervals
            .first()
            .map(|interval| CurrentRates {
                bytes_per_second: interval.bytes_per_second,
                bytes_per_minute: interval.bytes_per_second * 60.0,
                bytes_per_hour: interval.bytes_per_second * 3600.0,
            })
            .unwrap_or_default();

        let daily = self
            .daily
            .iter()
            .rev()
            .map(|(date, day)| {
                let mut peak_hour = 0u32;
                let mut peak_bytes = 0u64;
                for (hour, bucket) in day.hourly.iter().enumerate() {
                    if bucket.bytes > peak_bytes {
                        peak_bytes = bucket.bytes;
                        peak_hour = hour as u32;
                    }
                }
                DailySnapshot {
                    date: date.clone(),
                    total: day.total,
                    hourly: day.hourly,
                    bytes_per_second: day.total.bytes as f64 / 86_400.0,
                    bytes_per_hour: day.total.bytes as f64 / 24.0,
                    peak_hour,
                }
            })
            .collect();

        let weekly = self
            .weekly
            .iter()
            .rev()
            .map(|(week, bucket)| WeeklySnapshot {
                week: week.clone(),
                bytes: bucket.bytes,
                count: bucket.count,
                bytes_per_day: bucket.bytes as f64 / 7.0,
                bytes_per_hour: bucket.bytes as f64 / 168.0,
            })
            .collect();

        TimeStatsSnapshot {
            current,
            intervals,
            daily,
            weekly,
        }
    }
}

/// Derived rates from the newest interval bucket.
#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentRates {
    pub bytes_per_second: f64,
    pub bytes_per_minute: f64,
    pub bytes_per_hour: f64,
}

/// One rolling interval bucket.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSnapshot {
    /// Bucket start, unix seconds.
    pub timestamp: i64,
    pub bytes: u64,
    pub count: u64,
    pub bytes_per_second: f64,
}

/// One calendar-day bucket with hourly breakdown.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySnapshot {
    pub date: String,
    pub total: Bucket,
    pub hourly: [Bucket; 24],
    pub bytes_per_second: f64,
    pub bytes_per_hour: f64,
    /// Hour (0-23) with the highest byte volume.
    pub peak_hour: u32,
}

/// One week bucket, keyed by its Monday start date.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklySnapshot {
    pub week: String,
    pub bytes: u64,
    pub count: u64,
    pub bytes_per_day: f64,
    pub bytes_per_hour: f64,
}

/// The three retained resolutions plus current-rate derivations, interval
/// entries newest first.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeStatsSnapshot {
    pub current: CurrentRates,
    pub intervals: Vec<IntervalSnapshot>,
    pub daily: Vec<DailySnapshot>,
    pub weekly: Vec<WeeklySnapshot>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 8, h, m, 0).unwrap()
    }

    #[test]
    fn events_in_one_window_share_a_bucket() {
        let mut stats = TimeStats::new(900);
        stats.record_at(at(12, 0), 100);
        stats.record_at(at(12, 10), 50);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.intervals.len(), 1);
        assert_eq!(snapshot.intervals[0].bytes, 150);
        assert_eq!(snapshot.intervals[0].count, 2);

        // Minute 20 crosses the 15-minute boundary: a second bucket appears.
        stats.record_at(at(12, 20), 25);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.intervals.len(), 2);
        // Newest first.
        assert_eq!(snapshot.intervals[0].bytes, 25);
        assert_eq!(snapshot.intervals[1].bytes, 150);
    }

    #[test]
    fn interval_rates_derive_from_width() {
        let mut stats = TimeStats::new(900);
        stats.record_at(at(12, 0), 9000);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.intervals[0].bytes_per_second, 10.0);
        assert_eq!(snapshot.current.bytes_per_second, 10.0);
        assert_eq!(snapshot.current.bytes_per_minute, 600.0);
        assert_eq!(snapshot.current.bytes_per_hour, 36_000.0);
    }

    #[test]
    fn old_intervals_are_pruned_on_record() {
        let mut stats = TimeStats::new(900);
        stats.record_at(at(0, 0), 100);
        stats.record_at(at(0, 0) + Duration::days(2), 50);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.intervals.len(), 1);
        assert_eq!(snapshot.intervals[0].bytes, 50);
    }

    #[test]
    fn daily_buckets_track_hours_and_peak() {
        let mut stats = TimeStats::new(900);
        stats.record_at(at(3, 0), 10);
        stats.record_at(at(15, 0), 100);
        stats.record_at(at(15, 30), 100);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.daily.len(), 1);
        let day = &snapshot.daily[0];
        assert_eq!(day.date, "2024-05-08");
        assert_eq!(day.total.bytes, 210);
        assert_eq!(day.total.count, 3);
        assert_eq!(day.hourly[3].bytes, 10);
        assert_eq!(day.hourly[15].bytes, 200);
        assert_eq!(day.peak_hour, 15);
    }

    #[test]
    fn daily_retention_is_thirty_days() {
        let mut stats = TimeStats::new(900);
        for offset in 0..35 {
            stats.record_at(at(12, 0) + Duration::days(offset), 1);
        }
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.daily.len(), 30);
        // Newest first: the last recorded day leads.
        assert_eq!(snapshot.daily[0].date, "2024-06-11");
    }

    #[test]
    fn weeks_align_to_monday() {
        let mut stats = TimeStats::new(900);
        // 2024-05-08 is a Wednesday; its week starts 2024-05-06.
        stats.record_at(at(12, 0), 70);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.weekly.len(), 1);
        let week = &snapshot.weekly[0];
        assert_eq!(week.week, "2024-05-06");
        assert_eq!(week.bytes, 70);
        assert_eq!(week.bytes_per_day, 10.0);
    }

    #[test]
    fn weekly_retention_is_twelve_weeks() {
        let mut stats = TimeStats::new(900);
        for offset in 0..15 {
            stats.record_at(at(12, 0) + Duration::weeks(offset), 1);
        }
        assert_eq!(stats.snapshot().weekly.len(), 12);
    }

    #[test]
    fn empty_snapshot_has_zero_rates() {
        let stats = TimeStats::new(900);
        let snapshot = stats.snapshot();
        assert!(snapshot.intervals.is_empty());
        assert_eq!(snapshot.current.bytes_per_second, 0.0);
    }
}
