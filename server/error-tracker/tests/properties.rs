//! Property tests for aggregation and export invariants.

use chrono::{Duration, TimeZone, Utc};
use error_tracker::export::escape_csv_field;
use error_tracker::{ErrorEvent, ErrorFilter, ErrorTrackingService, ExportFormat, Severity};
use proptest::prelude::*;

fn severity() -> impl Strategy<Value = Severity> {
  prop_oneof![
    Just(Severity::Low),
    Just(Severity::Medium),
    Just(Severity::High),
    Just(Severity::Critical),
  ]
}

proptest! {
  #[test]
  fn identical_events_dedup_to_one(
    message in ".{1,40}",
    sev in severity(),
    components in proptest::collection::vec(proptest::option::of("[A-Z][a-z]{0,6}"), 1..30),
  ) {
    let service = ErrorTrackingService::with_defaults();
    let base = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
    for (i, component) in components.iter().enumerate() {
      let mut event = ErrorEvent::new(message.clone(), sev, base + Duration::seconds(i as i64));
      if let Some(c) = component {
        event = event.with_component(c.clone());
      }
      service.track(event);
    }
    let errors = service.errors(&ErrorFilter::default());
    prop_assert_eq!(errors.len(), 1);
    prop_assert_eq!(errors[0].count, components.len() as u64);
    prop_assert!(errors[0].last_occurrence >= errors[0].first_occurrence);
    for c in components.iter().flatten() {
      prop_assert!(errors[0].affected_components.contains(c));
    }
  }

  #[test]
  fn count_never_decreases(offsets in proptest::collection::vec(-600i64..600, 1..40)) {
    let service = ErrorTrackingService::with_defaults();
    let base = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
    let mut last = 0;
    for offset in offsets {
      service.track(ErrorEvent::new("boom", Severity::Medium, base + Duration::seconds(offset)));
      let count = service.errors(&ErrorFilter::default())[0].count;
      prop_assert!(count > last);
      last = count;
    }
  }

  #[test]
  fn json_export_total_matches_counts(
    events in proptest::collection::vec(("[a-c]", severity()), 0..50),
  ) {
    let service = ErrorTrackingService::with_defaults();
    let base = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
    for (message, sev) in &events {
      service.track(ErrorEvent::new(message.clone(), *sev, base));
    }
    let json = service.export(ExportFormat::Json).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    prop_assert_eq!(value["totalErrors"].as_u64(), Some(events.len() as u64));
  }

  #[test]
  fn csv_escaping_is_reversible(field in ".*") {
    let escaped = escape_csv_field(&field);
    let decoded = if escaped != field {
      escaped[1..escaped.len() - 1].replace("\"\"", "\"")
    } else {
      escaped.to_string()
    };
    prop_assert_eq!(decoded, field.clone());
    if field.contains('"') {
      prop_assert!(escaped.starts_with('"') && escaped.ends_with('"'));
    }
  }
}
