//! PushLog Error Tracker: in-process error aggregation and alerting.
//!
//! Receives error events, deduplicates them into aggregates keyed by a
//! message + severity signature, keeps minute-bucketed trends, derives
//! rate / severity / user-impact alerts, and exports JSON or CSV.
//!
//! No DB, no network; pure computation + in-memory state.

pub mod alerts;
pub mod config;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod logger;
pub mod normalize;
pub mod service;
pub mod summary;
pub mod trends;
pub mod types;

pub use config::TrackerConfig;
pub use error::TrackerError;
pub use logger::{initialize_error_tracking, ErrorLogger, LogListener};
pub use service::ErrorTrackingService;
pub use summary::error_summary_text;
pub use types::{
  AggregatedError, Alert, AlertKind, ErrorContext, ErrorEvent, ErrorFilter, ExportFormat,
  Granularity, InboundEvent, Severity, Stats, TimeRange, TrendBucket,
};
