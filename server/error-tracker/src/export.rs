//! JSON and CSV export of aggregates.

use std::borrow::Cow;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use crate::error::TrackerError;
use crate::types::AggregatedError;

pub const CSV_HEADER: &str =
  "Message,Severity,Count,First Occurrence,Last Occurrence,Affected Components,Affected Users";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDocument<'a> {
  export_date: DateTime<Utc>,
  total_errors: u64,
  errors: &'a [AggregatedError],
}

/// Pretty JSON document: `exportDate`, `totalErrors` and the full `errors` array.
pub fn to_json(errors: &[AggregatedError], exported_at: DateTime<Utc>) -> Result<String, TrackerError> {
  let doc = ExportDocument {
    export_date: exported_at,
    total_errors: errors.iter().map(|e| e.count).sum(),
    errors,
  };
  Ok(serde_json::to_string_pretty(&doc)?)
}

/// CSV with a header row and one row per aggregate. Set fields are `; `-joined.
pub fn to_csv(errors: &[AggregatedError]) -> String {
  let mut out = String::with_capacity(CSV_HEADER.len() + 1 + errors.len() * 96);
  out.push_str(CSV_HEADER);
  out.push('\n');

  for e in errors {
    let components = join_set(e.affected_components.iter());
    let users = join_set(e.affected_users.iter());
    let first = e.first_occurrence.to_rfc3339_opts(SecondsFormat::Millis, true);
    let last = e.last_occurrence.to_rfc3339_opts(SecondsFormat::Millis, true);
    let count = e.count.to_string();
    let row = [
      e.message.as_str(),
      e.severity.as_str(),
      count.as_str(),
      first.as_str(),
      last.as_str(),
      components.as_str(),
      users.as_str(),
    ];

    for (i, field) in row.iter().enumerate() {
      if i > 0 {
        out.push(',');
      }
      out.push_str(&escape_csv_field(field));
    }
    out.push('\n');
  }

  out
}

fn join_set<'a>(items: impl Iterator<Item = &'a String>) -> String {
  items.map(String::as_str).collect::<Vec<_>>().join("; ")
}

/// Standard CSV quoting: fields holding a quote, comma or line break are wrapped
/// in quotes with internal quotes doubled.
pub fn escape_csv_field(field: &str) -> Cow<'_, str> {
  if field.contains(['"', ',', '\n', '\r']) {
    Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
  } else {
    Cow::Borrowed(field)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::fingerprint;
  use crate::types::{ErrorEvent, Severity};
  use chrono::TimeZone;

  fn ts(min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 15, 10, min, 0).unwrap()
  }

  fn agg(message: &str, severity: Severity, count: u64) -> AggregatedError {
    let event = ErrorEvent::new(message, severity, ts(0))
      .with_component("Cart")
      .with_user("user1");
    let mut agg = AggregatedError::new(fingerprint::compute(&event), &event);
    for _ in 1..count {
      agg.record(&event);
    }
    agg
  }

  #[test]
  fn escape_plain_field_is_borrowed() {
    assert!(matches!(escape_csv_field("plain"), Cow::Borrowed("plain")));
  }

  #[test]
  fn escape_doubles_quotes() {
    assert_eq!(
      escape_csv_field(r#"Error with "quotes""#),
      r#""Error with ""quotes""""#
    );
  }

  #[test]
  fn escape_wraps_commas_and_newlines() {
    assert_eq!(escape_csv_field("a,b"), "\"a,b\"");
    assert_eq!(escape_csv_field("line1\nline2"), "\"line1\nline2\"");
  }

  #[test]
  fn csv_has_header_and_rows() {
    let csv = to_csv(&[agg("boom", Severity::High, 3)]);
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], CSV_HEADER);
    assert_eq!(
      lines[1],
      "boom,high,3,2025-01-15T10:00:00.000Z,2025-01-15T10:00:00.000Z,Cart,user1"
    );
  }

  #[test]
  fn json_totals_counts() {
    let errors = vec![agg("a", Severity::Low, 2), agg("b", Severity::Critical, 5)];
    let json = to_json(&errors, ts(30)).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["totalErrors"], 7);
    assert_eq!(value["exportDate"], "2025-01-15T10:30:00Z");
    assert_eq!(value["errors"].as_array().unwrap().len(), 2);
    assert_eq!(value["errors"][0]["affectedComponents"], serde_json::json!(["Cart"]));
    assert_eq!(value["errors"][0]["firstOccurrence"], "2025-01-15T10:00:00Z");
  }

  #[test]
  fn empty_csv_is_header_only() {
    assert_eq!(to_csv(&[]), format!("{}\n", CSV_HEADER));
  }
}
