//! Error tracking service: owns aggregate state, answers queries, derives alerts.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::alerts;
use crate::config::TrackerConfig;
use crate::error::TrackerError;
use crate::export;
use crate::fingerprint;
use crate::normalize;
use crate::trends::{minutes_before, TrendStore};
use crate::types::*;

#[derive(Debug)]
struct TrackerState {
  aggregates: HashMap<Signature, AggregatedError>,
  /// `(last_occurrence, signature)` for every aggregate; first entry is the eviction victim.
  recency: BTreeSet<(DateTime<Utc>, Signature)>,
  trends: TrendStore,
  /// Alert kinds currently surfaced, with the alert as first seen.
  surfaced: BTreeMap<AlertKind, Alert>,
}

impl TrackerState {
  fn new(config: &TrackerConfig) -> Self {
    Self {
      aggregates: HashMap::new(),
      recency: BTreeSet::new(),
      trends: TrendStore::new(config.max_trend_buckets),
      surfaced: BTreeMap::new(),
    }
  }

  /// Remove the aggregate seen least recently (ties by signature).
  fn evict_least_recent(&mut self) {
    let Some((_, signature)) = self.recency.pop_first() else {
      return;
    };
    if let Some(agg) = self.aggregates.remove(&signature) {
      debug!(signature = %signature, count = agg.count, "aggregate evicted");
    }
  }

  /// Aggregates ordered most recently seen first, ties by signature.
  fn sorted_aggregates<'a>(&'a self, filter: &ErrorFilter) -> Vec<&'a AggregatedError> {
    let mut out: Vec<&AggregatedError> = self
      .aggregates
      .values()
      .filter(|agg| filter.matches(agg))
      .collect();
    out.sort_by(|a, b| {
      b.last_occurrence
        .cmp(&a.last_occurrence)
        .then_with(|| a.signature.cmp(&b.signature))
    });
    out
  }
}

/// In-memory error aggregator. Construct one at startup and share it by
/// reference (`Arc`) with whatever reports errors.
///
/// Mutations take the write lock; queries take the read lock, so readers never
/// observe a half-applied `track`.
#[derive(Debug)]
pub struct ErrorTrackingService {
  config: TrackerConfig,
  state: RwLock<TrackerState>,
}

impl Default for ErrorTrackingService {
  fn default() -> Self {
    Self::with_defaults()
  }
}

impl ErrorTrackingService {
  pub fn new(config: TrackerConfig) -> Self {
    let state = RwLock::new(TrackerState::new(&config));
    Self { config, state }
  }

  pub fn with_defaults() -> Self {
    Self::new(TrackerConfig::default())
  }

  pub fn config(&self) -> &TrackerConfig {
    &self.config
  }

  // The state is updated in place with no intermediate invalid states, so a
  // panic in another holder leaves it usable.
  fn read(&self) -> RwLockReadGuard<'_, TrackerState> {
    self.state.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, TrackerState> {
    self.state.write().unwrap_or_else(PoisonError::into_inner)
  }

  /// Fold one event into its aggregate and the trend buckets.
  pub fn track(&self, event: ErrorEvent) {
    let signature = fingerprint::compute(&event);
    let mut guard = self.write();
    let state = &mut *guard;

    let count = match state.aggregates.get_mut(&signature) {
      Some(agg) => {
        let previous = agg.last_occurrence;
        agg.record(&event);
        if agg.last_occurrence != previous {
          state.recency.remove(&(previous, signature.clone()));
          state.recency.insert((agg.last_occurrence, signature.clone()));
        }
        agg.count
      }
      None => {
        if state.aggregates.len() >= self.config.max_aggregates {
          state.evict_least_recent();
        }
        let agg = AggregatedError::new(signature.clone(), &event);
        state.recency.insert((agg.last_occurrence, signature.clone()));
        state.aggregates.insert(signature.clone(), agg);
        1
      }
    };

    if let Some(dropped) = state.trends.record(event.timestamp) {
      debug!(bucket = %dropped, "trend bucket evicted");
    }

    debug!(
      signature = %signature,
      severity = %event.severity,
      count,
      "tracked error"
    );
  }

  /// Normalize a JSON-contract event and track it.
  pub fn track_inbound(&self, raw: &InboundEvent) -> Result<(), TrackerError> {
    let event = normalize::normalize(raw, Utc::now())?;
    self.track(event);
    Ok(())
  }

  pub fn stats(&self, range: Option<TimeRange>) -> Stats {
    self.stats_at(range, Utc::now())
  }

  /// Stats over aggregates whose `last_occurrence` falls in `range`.
  ///
  /// `now` only matters for the error rate of an unbounded range, which spans
  /// from the oldest tracked bucket to `now`.
  pub fn stats_at(&self, range: Option<TimeRange>, now: DateTime<Utc>) -> Stats {
    let state = self.read();

    let mut errors_by_severity: BTreeMap<Severity, u64> =
      Severity::ALL.iter().map(|s| (*s, 0)).collect();
    let mut errors_by_component: BTreeMap<String, u64> = BTreeMap::new();
    let mut affected_users = std::collections::BTreeSet::new();
    let mut total_errors = 0u64;
    let mut matching: Vec<&AggregatedError> = Vec::new();

    for agg in state.aggregates.values() {
      if let Some(r) = &range {
        if !r.contains(&agg.last_occurrence) {
          continue;
        }
      }
      total_errors += agg.count;
      *errors_by_severity.entry(agg.severity).or_insert(0) += agg.count;
      for component in &agg.affected_components {
        *errors_by_component.entry(component.clone()).or_insert(0) += agg.count;
      }
      affected_users.extend(agg.affected_users.iter().cloned());
      matching.push(agg);
    }

    matching.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.signature.cmp(&b.signature)));
    let top_errors: Vec<AggregatedError> = matching
      .into_iter()
      .take(self.config.top_errors_limit)
      .cloned()
      .collect();

    let (events, span) = match &range {
      Some(r) => (state.trends.count_in(r), r.end - r.start),
      None => (
        state.trends.total(),
        state.trends.oldest().map(|oldest| now - oldest).unwrap_or_else(Duration::zero),
      ),
    };
    let minutes = (span.num_seconds() as f64 / 60.0).max(1.0);
    let error_rate = if events == 0 { 0.0 } else { events as f64 / minutes };

    Stats {
      total_errors,
      errors_by_severity,
      errors_by_component,
      affected_users,
      error_rate,
      top_errors,
    }
  }

  /// Matching aggregates, most recently seen first, truncated to `filter.limit`.
  pub fn errors(&self, filter: &ErrorFilter) -> Vec<AggregatedError> {
    let state = self.read();
    let mut out: Vec<AggregatedError> = state
      .sorted_aggregates(filter)
      .into_iter()
      .cloned()
      .collect();
    if let Some(limit) = filter.limit {
      out.truncate(limit);
    }
    out
  }

  /// Up to `max_buckets` most recent non-empty buckets, oldest first.
  pub fn trends(&self, granularity: Granularity, max_buckets: usize) -> Vec<TrendBucket> {
    self.read().trends.buckets(granularity, max_buckets)
  }

  pub fn alerts(&self) -> Vec<Alert> {
    self.alerts_at(Utc::now())
  }

  /// Evaluate alert conditions as of `now`.
  ///
  /// The result depends only on tracked state and `now`. Surfaced-alert
  /// bookkeeping is updated on the side.
  pub fn alerts_at(&self, now: DateTime<Utc>) -> Vec<Alert> {
    let mut state = self.write();
    let active = alerts::evaluate(state.aggregates.values(), &state.trends, &self.config, now);

    for alert in &active {
      if !state.surfaced.contains_key(&alert.kind) {
        info!(kind = %alert.kind, value = alert.value, threshold = alert.threshold, "{}", alert.message);
        state.surfaced.insert(alert.kind, alert.clone());
      }
    }
    state.surfaced.retain(|kind, _| {
      let still_active = active.iter().any(|a| a.kind == *kind);
      if !still_active {
        info!(kind = %kind, "alert resolved");
      }
      still_active
    });

    active
  }

  /// Alerts as first surfaced and not yet resolved or aged out.
  pub fn surfaced_alerts(&self) -> Vec<Alert> {
    self.read().surfaced.values().cloned().collect()
  }

  pub fn clear_old_alerts(&self, max_age_minutes: u64) {
    self.clear_old_alerts_at(max_age_minutes, Utc::now());
  }

  /// Forget surfaced alerts first seen more than `max_age_minutes` before `now`.
  /// Conditions that still hold surface again on the next evaluation.
  pub fn clear_old_alerts_at(&self, max_age_minutes: u64, now: DateTime<Utc>) {
    let cutoff = minutes_before(now, max_age_minutes);
    let mut state = self.write();
    let before = state.surfaced.len();
    state.surfaced.retain(|_, alert| alert.timestamp >= cutoff);
    let dropped = before - state.surfaced.len();
    if dropped > 0 {
      debug!(dropped, max_age_minutes, "cleared old alerts");
    }
  }

  pub fn export(&self, format: ExportFormat) -> Result<String, TrackerError> {
    self.export_at(format, Utc::now())
  }

  /// Export every aggregate, most recently seen first.
  pub fn export_at(&self, format: ExportFormat, now: DateTime<Utc>) -> Result<String, TrackerError> {
    let errors = self.errors(&ErrorFilter::default());
    match format {
      ExportFormat::Json => export::to_json(&errors, now),
      ExportFormat::Csv => Ok(export::to_csv(&errors)),
    }
  }

  /// Drop all aggregates, trend buckets and alert state.
  pub fn clear(&self) {
    let mut state = self.write();
    let aggregates = state.aggregates.len();
    state.aggregates.clear();
    state.recency.clear();
    state.trends.clear();
    state.surfaced.clear();
    info!(aggregates, "error tracking state cleared");
  }

  pub fn is_healthy(&self) -> bool {
    self.is_healthy_at(Utc::now())
  }

  /// False while a severity or rate alert is active.
  pub fn is_healthy_at(&self, now: DateTime<Utc>) -> bool {
    alerts::is_healthy(&self.alerts_at(now))
  }

  /// Number of distinct signatures tracked.
  pub fn len(&self) -> usize {
    self.read().aggregates.len()
  }

  pub fn is_empty(&self) -> bool {
    self.read().aggregates.is_empty()
  }
}
