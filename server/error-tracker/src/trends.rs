//! Time-bucketed event counts: minute buckets, hour roll-up, recent-window counting.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::types::{Granularity, TimeRange, TrendBucket};

/// Truncate a timestamp to the start of its bucket.
pub fn bucket_start(ts: DateTime<Utc>, granularity: Granularity) -> DateTime<Utc> {
  let step: i64 = match granularity {
    Granularity::Minute => 60,
    Granularity::Hour => 3600,
  };
  // Whole-second arithmetic covers chrono's full range; the earliest
  // representable instant is itself hour-aligned, so this never underflows.
  let secs = ts.timestamp();
  DateTime::from_timestamp(secs - secs.rem_euclid(step), 0).unwrap_or(ts)
}

/// `now` minus `minutes`, saturating at the earliest representable instant.
pub fn minutes_before(now: DateTime<Utc>, minutes: u64) -> DateTime<Utc> {
  i64::try_from(minutes)
    .ok()
    .and_then(Duration::try_minutes)
    .and_then(|d| now.checked_sub_signed(d))
    .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Minute-granularity event counts, capped at `max_buckets` (oldest dropped first).
#[derive(Debug, Clone)]
pub struct TrendStore {
  minutes: BTreeMap<DateTime<Utc>, u64>,
  max_buckets: usize,
}

impl TrendStore {
  pub fn new(max_buckets: usize) -> Self {
    Self {
      minutes: BTreeMap::new(),
      max_buckets: max_buckets.max(1),
    }
  }

  /// Count one event. Returns the start of a bucket evicted to stay within the cap.
  pub fn record(&mut self, ts: DateTime<Utc>) -> Option<DateTime<Utc>> {
    *self.minutes.entry(bucket_start(ts, Granularity::Minute)).or_insert(0) += 1;

    if self.minutes.len() > self.max_buckets {
      self.minutes.pop_first().map(|(start, _)| start)
    } else {
      None
    }
  }

  /// The `max_buckets` most recent non-empty buckets, oldest first.
  pub fn buckets(&self, granularity: Granularity, max_buckets: usize) -> Vec<TrendBucket> {
    let mut out: Vec<TrendBucket> = Vec::new();
    // Walk newest first, folding consecutive minutes into their bucket.
    for (start, count) in self.minutes.iter().rev() {
      let timestamp = bucket_start(*start, granularity);
      match out.last_mut() {
        Some(bucket) if bucket.timestamp == timestamp => bucket.count += count,
        _ => {
          if out.len() == max_buckets {
            break;
          }
          out.push(TrendBucket { timestamp, count: *count });
        }
      }
    }
    out.reverse();
    out
  }

  /// Events in minute buckets starting at or after the bucket containing `cutoff`.
  ///
  /// The whole cutoff minute is counted, so a window of N minutes reaches back
  /// up to N minutes and 59 seconds.
  pub fn count_since(&self, cutoff: DateTime<Utc>) -> u64 {
    self
      .minutes
      .range(bucket_start(cutoff, Granularity::Minute)..)
      .map(|(_, count)| count)
      .sum()
  }

  /// Events in minute buckets overlapping `range`.
  pub fn count_in(&self, range: &TimeRange) -> u64 {
    if range.end < range.start {
      return 0;
    }
    self
      .minutes
      .range(bucket_start(range.start, Granularity::Minute)..=range.end)
      .map(|(_, count)| count)
      .sum()
  }

  pub fn total(&self) -> u64 {
    self.minutes.values().sum()
  }

  pub fn oldest(&self) -> Option<DateTime<Utc>> {
    self.minutes.keys().next().copied()
  }

  pub fn len(&self) -> usize {
    self.minutes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.minutes.is_empty()
  }

  pub fn clear(&mut self) {
    self.minutes.clear();
  }
}
