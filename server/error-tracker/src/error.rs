//! Tracker errors.
//!
//! Tracking itself never fails; errors only surface at the edges: inbound
//! events that cannot be normalized, unusable `ERROR_TRACKER_*` settings and
//! JSON encoding or decoding.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrackerError {
  /// An inbound event or query argument failed validation.
  #[error("invalid {field}: {reason}")]
  Validation { field: String, reason: String },

  /// An environment setting could not be used.
  #[error("config {var}: {reason}")]
  Config { var: String, reason: String },

  #[error("json: {0}")]
  Json(#[from] serde_json::Error),
}

impl TrackerError {
  pub fn validation(field: &str, reason: &str) -> Self {
    Self::Validation {
      field: field.to_string(),
      reason: reason.to_string(),
    }
  }

  pub fn config(var: &str, reason: impl Into<String>) -> Self {
    Self::Config {
      var: var.to_string(),
      reason: reason.into(),
    }
  }

  /// Name of the offending field or variable, when there is one.
  pub fn field(&self) -> Option<&str> {
    match self {
      Self::Validation { field, .. } => Some(field),
      Self::Config { var, .. } => Some(var),
      Self::Json(_) => None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn field_names_the_culprit() {
    assert_eq!(TrackerError::validation("severity", "bad").field(), Some("severity"));
    assert_eq!(
      TrackerError::config("ERROR_TRACKER_TOP_ERRORS", "bad").field(),
      Some("ERROR_TRACKER_TOP_ERRORS")
    );
  }

  #[test]
  fn json_errors_convert() {
    let err: TrackerError = serde_json::from_str::<u32>("nope").unwrap_err().into();
    assert!(err.field().is_none());
    assert!(err.to_string().starts_with("json: "));
  }

  #[test]
  fn display_includes_reason() {
    let err = TrackerError::config("ERROR_TRACKER_CRITICAL_ALERTS", "expected a boolean");
    assert_eq!(err.to_string(), "config ERROR_TRACKER_CRITICAL_ALERTS: expected a boolean");
  }
}
