//! Plain-text error summary for dashboards and logs.
//!
//! The anchors "Error Summary", "Total Errors:" and "By Severity:" are grepped
//! for by consumers; keep them stable.

use std::fmt::Write;

use crate::types::{Severity, Stats};

pub fn error_summary_text(stats: &Stats) -> String {
  let mut out = String::new();
  // Writing into a String cannot fail.
  let _ = write_summary(&mut out, stats);
  out
}

fn write_summary(out: &mut String, stats: &Stats) -> std::fmt::Result {
  writeln!(out, "Error Summary")?;
  writeln!(out, "=============")?;
  writeln!(out, "Total Errors: {}", stats.total_errors)?;
  writeln!(out, "Error Rate: {:.2}/min", stats.error_rate)?;
  writeln!(out, "Affected Users: {}", stats.affected_users.len())?;

  writeln!(out)?;
  writeln!(out, "By Severity:")?;
  for severity in Severity::ALL.iter().rev() {
    let count = stats.errors_by_severity.get(severity).copied().unwrap_or(0);
    writeln!(out, "  {}: {}", severity, count)?;
  }

  if !stats.errors_by_component.is_empty() {
    let mut components: Vec<_> = stats.errors_by_component.iter().collect();
    components.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    writeln!(out)?;
    writeln!(out, "By Component:")?;
    for (component, count) in components {
      writeln!(out, "  {}: {}", component, count)?;
    }
  }

  if !stats.top_errors.is_empty() {
    writeln!(out)?;
    writeln!(out, "Top Errors:")?;
    for (i, e) in stats.top_errors.iter().enumerate() {
      writeln!(out, "  {}. [{}] {} ({}x)", i + 1, e.severity, e.message, e.count)?;
    }
  }

  Ok(())
}
