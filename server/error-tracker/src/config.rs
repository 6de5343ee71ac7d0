//! Tracker configuration with sane defaults and env overrides.

use std::str::FromStr;

use crate::error::TrackerError;

/// Tunable thresholds and memory bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
  /// Rate alert fires when more than this many events land in the rate window.
  pub rate_threshold: u64,
  /// Width of the "recent" window for rate alerts, in minutes. Counting is per
  /// minute bucket and includes the whole minute the window starts in, so the
  /// effective window is up to one minute wider.
  pub rate_window_minutes: u64,
  /// Emit a severity alert while any critical aggregate exists.
  pub critical_alerts_enabled: bool,
  /// User-impact alert fires when more distinct users than this were affected.
  pub user_impact_threshold: u64,
  /// Only aggregates seen within this many minutes count towards user impact.
  pub user_impact_window_minutes: u64,
  /// Max aggregates reported in `Stats::top_errors`.
  pub top_errors_limit: usize,
  /// Max distinct signatures kept; the least recently seen one is evicted past this.
  pub max_aggregates: usize,
  /// Max minute buckets kept; the oldest is dropped past this.
  pub max_trend_buckets: usize,
}

impl Default for TrackerConfig {
  fn default() -> Self {
    Self {
      rate_threshold: 10,
      rate_window_minutes: 5,
      critical_alerts_enabled: true,
      user_impact_threshold: 5,
      user_impact_window_minutes: 60,
      top_errors_limit: 10,
      max_aggregates: 10_000,
      max_trend_buckets: 7 * 24 * 60,
    }
  }
}

impl TrackerConfig {
  /// Defaults overridden by `ERROR_TRACKER_*` environment variables.
  pub fn from_env() -> Result<Self, TrackerError> {
    Self::from_lookup(|name| std::env::var(name).ok())
  }

  /// Same as [`from_env`](Self::from_env) but reads variables through `lookup`.
  pub fn from_lookup<F>(lookup: F) -> Result<Self, TrackerError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let mut config = Self::default();

    if let Some(v) = parse_var(&lookup, "ERROR_TRACKER_RATE_THRESHOLD")? {
      config.rate_threshold = v;
    }
    if let Some(v) = parse_var(&lookup, "ERROR_TRACKER_RATE_WINDOW_MINUTES")? {
      config.rate_window_minutes = v;
    }
    if let Some(raw) = lookup("ERROR_TRACKER_CRITICAL_ALERTS") {
      config.critical_alerts_enabled = parse_bool("ERROR_TRACKER_CRITICAL_ALERTS", &raw)?;
    }
    if let Some(v) = parse_var(&lookup, "ERROR_TRACKER_USER_IMPACT_THRESHOLD")? {
      config.user_impact_threshold = v;
    }
    if let Some(v) = parse_var(&lookup, "ERROR_TRACKER_USER_IMPACT_WINDOW_MINUTES")? {
      config.user_impact_window_minutes = v;
    }
    if let Some(v) = parse_var(&lookup, "ERROR_TRACKER_TOP_ERRORS")? {
      config.top_errors_limit = v;
    }
    if let Some(v) = parse_var(&lookup, "ERROR_TRACKER_MAX_AGGREGATES")? {
      config.max_aggregates = v;
    }
    if let Some(v) = parse_var(&lookup, "ERROR_TRACKER_MAX_TREND_BUCKETS")? {
      config.max_trend_buckets = v;
    }

    config.validate()?;
    Ok(config)
  }

  pub fn validate(&self) -> Result<(), TrackerError> {
    if self.rate_window_minutes == 0 {
      return Err(TrackerError::validation("rate_window_minutes", "must be at least 1"));
    }
    if self.max_aggregates == 0 {
      return Err(TrackerError::validation("max_aggregates", "must be at least 1"));
    }
    if self.max_trend_buckets == 0 {
      return Err(TrackerError::validation("max_trend_buckets", "must be at least 1"));
    }
    Ok(())
  }
}

fn parse_var<F, T>(lookup: &F, name: &str) -> Result<Option<T>, TrackerError>
where
  F: Fn(&str) -> Option<String>,
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match lookup(name) {
    Some(raw) => raw
      .trim()
      .parse::<T>()
      .map(Some)
      .map_err(|e| TrackerError::config(name, format!("invalid value {:?}: {}", raw, e))),
    None => Ok(None),
  }
}

fn parse_bool(name: &str, raw: &str) -> Result<bool, TrackerError> {
  match raw.trim().to_ascii_lowercase().as_str() {
    "1" | "true" | "yes" | "on" => Ok(true),
    "0" | "false" | "no" | "off" => Ok(false),
    _ => Err(TrackerError::config(name, format!("expected a boolean, got {:?}", raw))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
      .iter()
      .map(|(k, v)| (k.to_string(), v.to_string()))
      .collect();
    move |name| map.get(name).cloned()
  }

  #[test]
  fn no_vars_gives_defaults() {
    let config = TrackerConfig::from_lookup(lookup(&[])).unwrap();
    assert_eq!(config, TrackerConfig::default());
  }

  #[test]
  fn vars_override_defaults() {
    let config = TrackerConfig::from_lookup(lookup(&[
      ("ERROR_TRACKER_RATE_THRESHOLD", "50"),
      ("ERROR_TRACKER_CRITICAL_ALERTS", "off"),
      ("ERROR_TRACKER_MAX_AGGREGATES", " 200 "),
    ]))
    .unwrap();
    assert_eq!(config.rate_threshold, 50);
    assert!(!config.critical_alerts_enabled);
    assert_eq!(config.max_aggregates, 200);
    assert_eq!(config.user_impact_threshold, 5);
  }

  #[test]
  fn invalid_var_names_the_variable() {
    let err = TrackerConfig::from_lookup(lookup(&[("ERROR_TRACKER_TOP_ERRORS", "ten")])).unwrap_err();
    assert!(err.to_string().contains("ERROR_TRACKER_TOP_ERRORS"));
  }

  #[test]
  fn bad_bool_is_a_config_error() {
    let err = TrackerConfig::from_lookup(lookup(&[("ERROR_TRACKER_CRITICAL_ALERTS", "maybe")])).unwrap_err();
    assert!(matches!(err, TrackerError::Config { .. }));
    assert_eq!(err.field(), Some("ERROR_TRACKER_CRITICAL_ALERTS"));
  }

  #[test]
  fn zero_window_rejected() {
    let err =
      TrackerConfig::from_lookup(lookup(&[("ERROR_TRACKER_RATE_WINDOW_MINUTES", "0")])).unwrap_err();
    assert!(err.to_string().contains("rate_window_minutes"));
  }
}
