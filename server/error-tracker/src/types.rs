//! Core types for the error tracker (JSON contracts + internal models).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TrackerError;

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

impl Severity {
  pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

  pub fn from_str_loose(s: &str) -> Option<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "low" | "info" | "debug" => Some(Self::Low),
      "medium" | "warning" | "warn" => Some(Self::Medium),
      "high" | "error" | "err" => Some(Self::High),
      "critical" | "fatal" | "crit" => Some(Self::Critical),
      _ => None,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Low => "low",
      Self::Medium => "medium",
      Self::High => "high",
      Self::Critical => "critical",
    }
  }
}

impl fmt::Display for Severity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ---------------------------------------------------------------------------
// Inbound types
// ---------------------------------------------------------------------------

/// Structured metadata attached to an event. Only `component` and `userId` are
/// interpreted; everything else is carried along untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorContext {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub component: Option<String>,
  #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl ErrorContext {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_component(mut self, component: impl Into<String>) -> Self {
    self.component = Some(component.into());
    self
  }

  pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
    self.user_id = Some(user_id.into());
    self
  }

  /// Build a context from arbitrary JSON. Anything that is not an object yields
  /// an empty context; `component`/`userId` that are not non-empty strings are
  /// treated as absent and left in `extra`.
  pub fn from_value(value: &Value) -> Self {
    let Some(obj) = value.as_object() else {
      return Self::default();
    };

    let mut extra = obj.clone();
    let component = take_string(&mut extra, "component");
    let user_id = take_string(&mut extra, "userId").or_else(|| take_string(&mut extra, "user_id"));

    Self {
      component,
      user_id,
      extra,
    }
  }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
  match map.get(key) {
    Some(Value::String(s)) if !s.trim().is_empty() => {
      let s = s.trim().to_string();
      map.remove(key);
      Some(s)
    }
    _ => None,
  }
}

/// One observed failure occurrence.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
  pub message: String,
  pub severity: Severity,
  pub context: ErrorContext,
  pub timestamp: DateTime<Utc>,
  pub stack: Option<String>,
}

impl ErrorEvent {
  pub fn new(message: impl Into<String>, severity: Severity, timestamp: DateTime<Utc>) -> Self {
    Self {
      message: message.into(),
      severity,
      context: ErrorContext::default(),
      timestamp,
      stack: None,
    }
  }

  pub fn with_context(mut self, context: ErrorContext) -> Self {
    self.context = context;
    self
  }

  pub fn with_component(mut self, component: impl Into<String>) -> Self {
    self.context.component = Some(component.into());
    self
  }

  pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
    self.context.user_id = Some(user_id.into());
    self
  }

  pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
    self.stack = Some(stack.into());
    self
  }
}

/// One inbound event line (JSON contract). Unknown fields are silently ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundEvent {
  pub message: String,
  pub severity: String,
  #[serde(default)]
  pub context: Option<Value>,
  /// RFC 3339. Missing means "now".
  #[serde(default)]
  pub timestamp: Option<String>,
  #[serde(default)]
  pub stack: Option<String>,
}

// ---------------------------------------------------------------------------
// Signature
// ---------------------------------------------------------------------------

/// Dedup key: a stable hex string derived from message + severity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Signature(pub String);

impl fmt::Display for Signature {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

// ---------------------------------------------------------------------------
// Aggregates
// ---------------------------------------------------------------------------

/// Rollup of every occurrence sharing one signature.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedError {
  pub signature: Signature,
  pub message: String,
  pub severity: Severity,
  pub count: u64,
  pub first_occurrence: DateTime<Utc>,
  pub last_occurrence: DateTime<Utc>,
  pub affected_components: BTreeSet<String>,
  pub affected_users: BTreeSet<String>,
  /// Most recent stack trace seen for this signature.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub stack: Option<String>,
}

impl AggregatedError {
  pub fn new(signature: Signature, event: &ErrorEvent) -> Self {
    let mut agg = Self {
      signature,
      message: event.message.clone(),
      severity: event.severity,
      count: 0,
      first_occurrence: event.timestamp,
      last_occurrence: event.timestamp,
      affected_components: BTreeSet::new(),
      affected_users: BTreeSet::new(),
      stack: None,
    };
    agg.record(event);
    agg
  }

  /// Fold one more occurrence into the aggregate.
  ///
  /// Occurrence bounds only ever widen, so an out-of-order event can move
  /// `first_occurrence` back but never pulls `last_occurrence` backwards.
  pub fn record(&mut self, event: &ErrorEvent) {
    self.count += 1;
    if event.timestamp > self.last_occurrence {
      self.last_occurrence = event.timestamp;
    }
    if event.timestamp < self.first_occurrence {
      self.first_occurrence = event.timestamp;
    }
    if let Some(component) = &event.context.component {
      self.affected_components.insert(component.clone());
    }
    if let Some(user) = &event.context.user_id {
      self.affected_users.insert(user.clone());
    }
    if event.stack.is_some() {
      self.stack = event.stack.clone();
    }
  }
}

// ---------------------------------------------------------------------------
// Trends
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
  Minute,
  Hour,
}

impl FromStr for Granularity {
  type Err = TrackerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "minute" | "min" | "m" => Ok(Self::Minute),
      "hour" | "h" => Ok(Self::Hour),
      other => Err(TrackerError::validation(
        "granularity",
        &format!("expected minute|hour, got {:?}", other),
      )),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendBucket {
  pub timestamp: DateTime<Utc>,
  pub count: u64,
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
  Rate,
  Severity,
  UserImpact,
}

impl AlertKind {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Rate => "rate",
      Self::Severity => "severity",
      Self::UserImpact => "user-impact",
    }
  }
}

impl fmt::Display for AlertKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A derived notification that some threshold condition currently holds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
  #[serde(rename = "type")]
  pub kind: AlertKind,
  pub message: String,
  pub timestamp: DateTime<Utc>,
  /// Observed value that tripped the condition.
  pub value: u64,
  pub threshold: u64,
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Inclusive time range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
  pub start: DateTime<Utc>,
  pub end: DateTime<Utc>,
}

impl TimeRange {
  pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
    Self { start, end }
  }

  pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
    *ts >= self.start && *ts <= self.end
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
  pub total_errors: u64,
  pub errors_by_severity: BTreeMap<Severity, u64>,
  pub errors_by_component: BTreeMap<String, u64>,
  pub affected_users: BTreeSet<String>,
  /// Errors per minute over the requested range.
  pub error_rate: f64,
  pub top_errors: Vec<AggregatedError>,
}

/// AND-combined filter over aggregates. Empty lists impose no constraint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorFilter {
  pub severity: Vec<Severity>,
  pub component: Vec<String>,
  pub user_id: Option<String>,
  pub start_date: Option<DateTime<Utc>>,
  pub end_date: Option<DateTime<Utc>>,
  pub limit: Option<usize>,
}

impl ErrorFilter {
  pub fn matches(&self, agg: &AggregatedError) -> bool {
    if !self.severity.is_empty() && !self.severity.contains(&agg.severity) {
      return false;
    }
    if !self.component.is_empty()
      && !self
        .component
        .iter()
        .any(|c| agg.affected_components.contains(c))
    {
      return false;
    }
    if let Some(user) = &self.user_id {
      if !agg.affected_users.contains(user) {
        return false;
      }
    }
    if let Some(start) = &self.start_date {
      if agg.last_occurrence < *start {
        return false;
      }
    }
    if let Some(end) = &self.end_date {
      if agg.last_occurrence > *end {
        return false;
      }
    }
    true
  }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
  Json,
  Csv,
}

impl FromStr for ExportFormat {
  type Err = TrackerError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "json" => Ok(Self::Json),
      "csv" => Ok(Self::Csv),
      other => Err(TrackerError::validation(
        "format",
        &format!("expected json|csv, got {:?}", other),
      )),
    }
  }
}

// ---------------------------------------------------------------------------
// CLI stream wrappers
// ---------------------------------------------------------------------------

/// Structured error output for invalid input lines.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorOutput {
  pub error: bool,
  pub message: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub field: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub line: Option<usize>,
}

impl ErrorOutput {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      error: true,
      message: message.into(),
      field: None,
      line: None,
    }
  }

  pub fn with_field(mut self, field: impl Into<String>) -> Self {
    self.field = Some(field.into());
    self
  }

  pub fn at_line(mut self, line: usize) -> Self {
    self.line = Some(line);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use serde_json::json;

  fn ts(sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, sec).unwrap()
  }

  #[test]
  fn severity_loose_parsing() {
    assert_eq!(Severity::from_str_loose("CRITICAL"), Some(Severity::Critical));
    assert_eq!(Severity::from_str_loose("warn"), Some(Severity::Medium));
    assert_eq!(Severity::from_str_loose(" error "), Some(Severity::High));
    assert_eq!(Severity::from_str_loose("nope"), None);
  }

  #[test]
  fn context_from_non_object_is_empty() {
    assert_eq!(ErrorContext::from_value(&json!("oops")), ErrorContext::default());
    assert_eq!(ErrorContext::from_value(&Value::Null), ErrorContext::default());
  }

  #[test]
  fn context_ignores_non_string_fields() {
    let ctx = ErrorContext::from_value(&json!({"component": 42, "userId": "u1", "page": "/cart"}));
    assert_eq!(ctx.component, None);
    assert_eq!(ctx.user_id.as_deref(), Some("u1"));
    assert_eq!(ctx.extra.get("component"), Some(&json!(42)));
    assert_eq!(ctx.extra.get("page"), Some(&json!("/cart")));
  }

  #[test]
  fn record_widens_occurrence_bounds() {
    let first = ErrorEvent::new("boom", Severity::High, ts(30));
    let mut agg = AggregatedError::new(Signature("sig".into()), &first);
    agg.record(&ErrorEvent::new("boom", Severity::High, ts(10)));
    assert_eq!(agg.count, 2);
    assert_eq!(agg.first_occurrence, ts(10));
    assert_eq!(agg.last_occurrence, ts(30));
  }

  #[test]
  fn filter_empty_lists_match_everything() {
    let agg = AggregatedError::new(
      Signature("sig".into()),
      &ErrorEvent::new("boom", Severity::Low, ts(0)).with_component("Cart"),
    );
    assert!(ErrorFilter::default().matches(&agg));
    let filter = ErrorFilter {
      component: vec!["Checkout".into(), "Cart".into()],
      ..ErrorFilter::default()
    };
    assert!(filter.matches(&agg));
  }

  #[test]
  fn alert_kind_serializes_kebab_case() {
    assert_eq!(serde_json::to_value(AlertKind::UserImpact).unwrap(), json!("user-impact"));
  }

  #[test]
  fn export_format_parse() {
    assert_eq!("JSON".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
    assert!("xml".parse::<ExportFormat>().is_err());
  }
}
