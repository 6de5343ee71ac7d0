//! Alert evaluation: rate / severity / user-impact thresholds over current state.
//!
//! Alerts are a pure function of the aggregates, the trend store and `now`;
//! nothing here is persisted.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::config::TrackerConfig;
use crate::trends::{minutes_before, TrendStore};
use crate::types::{AggregatedError, Alert, AlertKind, Severity};

/// Evaluate every alert condition, in kind order (rate, severity, user-impact).
pub fn evaluate<'a, I>(
  aggregates: I,
  trends: &TrendStore,
  config: &TrackerConfig,
  now: DateTime<Utc>,
) -> Vec<Alert>
where
  I: IntoIterator<Item = &'a AggregatedError>,
{
  let mut alerts = Vec::new();

  // Rate: events inside the recent window.
  let recent = trends.count_since(minutes_before(now, config.rate_window_minutes));
  if recent > config.rate_threshold {
    alerts.push(Alert {
      kind: AlertKind::Rate,
      message: format!(
        "{} errors in the last {} minutes (threshold {})",
        recent, config.rate_window_minutes, config.rate_threshold
      ),
      timestamp: now,
      value: recent,
      threshold: config.rate_threshold,
    });
  }

  let user_cutoff = minutes_before(now, config.user_impact_window_minutes);
  let mut critical = 0u64;
  let mut recent_users: BTreeSet<&str> = BTreeSet::new();
  for agg in aggregates {
    if agg.severity == Severity::Critical {
      critical += 1;
    }
    if agg.last_occurrence >= user_cutoff {
      recent_users.extend(agg.affected_users.iter().map(String::as_str));
    }
  }

  // Severity: any critical aggregate.
  if config.critical_alerts_enabled && critical > 0 {
    alerts.push(Alert {
      kind: AlertKind::Severity,
      message: format!("{} critical error(s) detected", critical),
      timestamp: now,
      value: critical,
      threshold: 0,
    });
  }

  // User impact: distinct users across recently seen aggregates.
  let users = recent_users.len() as u64;
  if users > config.user_impact_threshold {
    alerts.push(Alert {
      kind: AlertKind::UserImpact,
      message: format!(
        "{} users affected in the last {} minutes (threshold {})",
        users, config.user_impact_window_minutes, config.user_impact_threshold
      ),
      timestamp: now,
      value: users,
      threshold: config.user_impact_threshold,
    });
  }

  alerts
}

/// Health signal: unhealthy while a severity or rate alert is active.
pub fn is_healthy(alerts: &[Alert]) -> bool {
  !alerts
    .iter()
    .any(|a| matches!(a.kind, AlertKind::Severity | AlertKind::Rate))
}
