//! Normalize inbound JSON events into canonical `ErrorEvent`s.

use chrono::{DateTime, Utc};

use crate::error::TrackerError;
use crate::types::*;

/// Parse and normalize an InboundEvent, using `now` when no timestamp is given.
///
/// Only `message`, `severity` and a present `timestamp` are validated. The
/// context is best-effort: anything unusable is treated as absent.
pub fn normalize(raw: &InboundEvent, now: DateTime<Utc>) -> Result<ErrorEvent, TrackerError> {
  let message = raw.message.trim();
  if message.is_empty() {
    return Err(TrackerError::validation("message", "must not be empty"));
  }

  let severity = Severity::from_str_loose(&raw.severity)
    .ok_or_else(|| TrackerError::validation("severity", "expected low|medium|high|critical"))?;

  let timestamp = match raw.timestamp.as_deref().map(str::trim) {
    Some(ts) if !ts.is_empty() => DateTime::parse_from_rfc3339(ts)
      .map_err(|e| TrackerError::validation("timestamp", &format!("invalid RFC3339: {}", e)))?
      .with_timezone(&Utc),
    _ => now,
  };

  let context = raw
    .context
    .as_ref()
    .map(ErrorContext::from_value)
    .unwrap_or_default();

  let stack = raw
    .stack
    .as_ref()
    .filter(|s| !s.trim().is_empty())
    .cloned();

  Ok(ErrorEvent {
    message: message.to_string(),
    severity,
    context,
    timestamp,
    stack,
  })
}
