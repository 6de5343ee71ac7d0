//! Binary entrypoint: read JSON lines from stdin, print an export at EOF.
//!
//! Each input line is an InboundEvent. Invalid lines produce an ErrorOutput
//! JSON line on stdout and are otherwise skipped. At EOF the tracked state is
//! printed in the format named by the first argument:
//! - `json` (default) or `csv`: the export document
//! - `summary`: the summary text followed by any active alerts

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use error_tracker::types::ErrorOutput;
use error_tracker::{
  error_summary_text, ErrorTrackingService, ExportFormat, InboundEvent, TrackerConfig, TrackerError,
};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

enum OutputMode {
  Export(ExportFormat),
  Summary,
}

fn parse_mode(arg: Option<String>) -> Result<OutputMode, TrackerError> {
  match arg.as_deref() {
    None => Ok(OutputMode::Export(ExportFormat::Json)),
    Some("summary") => Ok(OutputMode::Summary),
    Some(other) => other.parse().map(OutputMode::Export),
  }
}

fn main() -> ExitCode {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("error_tracker=info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();

  match run() {
    Ok(()) => ExitCode::SUCCESS,
    Err(e) => {
      error!(error = %e, "error-tracker failed");
      ExitCode::FAILURE
    }
  }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
  let mode = parse_mode(std::env::args().nth(1))?;
  let config = TrackerConfig::from_env()?;
  info!(
    rate_threshold = config.rate_threshold,
    user_impact_threshold = config.user_impact_threshold,
    max_aggregates = config.max_aggregates,
    "configuration loaded"
  );
  let service = ErrorTrackingService::new(config);

  let stdin = io::stdin();
  let stdout = io::stdout();
  let mut out = io::BufWriter::new(stdout.lock());
  let mut tracked = 0usize;
  let mut rejected = 0usize;

  for (idx, line) in stdin.lock().lines().enumerate() {
    let line = line?;
    let line_no = idx + 1;

    // Skip blank lines.
    let trimmed = line.trim();
    if trimmed.is_empty() {
      continue;
    }

    let result = serde_json::from_str::<InboundEvent>(trimmed)
      .map_err(TrackerError::from)
      .and_then(|raw| service.track_inbound(&raw));

    match result {
      Ok(()) => tracked += 1,
      Err(e) => {
        rejected += 1;
        let err = match &e {
          TrackerError::Validation { reason, .. } => ErrorOutput::new(reason.clone()),
          _ => ErrorOutput::new(e.to_string()),
        };
        let err = match e.field() {
          Some(field) => err.with_field(field),
          None => err,
        };
        serde_json::to_writer(&mut out, &err.at_line(line_no))?;
        writeln!(out)?;
      }
    }
  }

  info!(tracked, rejected, aggregates = service.len(), "input consumed");

  match mode {
    OutputMode::Export(format) => {
      writeln!(out, "{}", service.export(format)?.trim_end())?;
    }
    OutputMode::Summary => {
      write!(out, "{}", error_summary_text(&service.stats(None)))?;
      let alerts = service.alerts();
      if !alerts.is_empty() {
        writeln!(out)?;
        writeln!(out, "Active Alerts:")?;
        for alert in &alerts {
          writeln!(out, "  [{}] {}", alert.kind, alert.message)?;
        }
      }
      writeln!(out)?;
      writeln!(out, "Healthy: {}", service.is_healthy())?;
    }
  }

  out.flush()?;
  Ok(())
}
