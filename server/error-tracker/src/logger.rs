//! Process-wide error logger with explicit listener registration.
//!
//! Every logged event is written through `tracing` and then handed to each
//! subscribed [`LogListener`]. [`initialize_error_tracking`] subscribes an
//! [`ErrorTrackingService`] so logged errors are aggregated.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{error, info, warn};

use crate::service::ErrorTrackingService;
use crate::types::{ErrorContext, ErrorEvent, Severity};

/// Receives every event passed to [`ErrorLogger`].
pub trait LogListener: Send + Sync {
  fn on_log(&self, event: &ErrorEvent);
}

impl LogListener for ErrorTrackingService {
  fn on_log(&self, event: &ErrorEvent) {
    self.track(event.clone());
  }
}

/// Handle returned by [`ErrorLogger::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Listeners {
  next_id: u64,
  entries: Vec<(SubscriptionId, Arc<dyn LogListener>)>,
}

#[derive(Default)]
pub struct ErrorLogger {
  listeners: RwLock<Listeners>,
}

impl fmt::Debug for ErrorLogger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ErrorLogger")
      .field("listeners", &self.listener_count())
      .finish()
  }
}

impl ErrorLogger {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self, listener: Arc<dyn LogListener>) -> SubscriptionId {
    let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
    let id = SubscriptionId(listeners.next_id);
    listeners.next_id += 1;
    listeners.entries.push((id, listener));
    id
  }

  /// Returns false if `id` was not subscribed.
  pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
    let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
    let before = listeners.entries.len();
    listeners.entries.retain(|(entry_id, _)| *entry_id != id);
    listeners.entries.len() != before
  }

  pub fn listener_count(&self) -> usize {
    self
      .listeners
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .entries
      .len()
  }

  /// Log a message observed now.
  pub fn log(&self, message: impl Into<String>, severity: Severity, context: ErrorContext) {
    self.log_event(ErrorEvent::new(message, severity, Utc::now()).with_context(context));
  }

  /// Log an error value; its `source()` chain becomes the stack.
  pub fn log_error<E>(&self, err: &E, severity: Severity, context: ErrorContext)
  where
    E: std::error::Error + ?Sized,
  {
    let mut event = ErrorEvent::new(err.to_string(), severity, Utc::now()).with_context(context);
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
      chain.push(format!("caused by: {}", cause));
      source = cause.source();
    }
    if !chain.is_empty() {
      event.stack = Some(chain.join("\n"));
    }
    self.log_event(event);
  }

  pub fn log_event(&self, event: ErrorEvent) {
    let component = event.context.component.as_deref().unwrap_or("-");
    let user = event.context.user_id.as_deref().unwrap_or("-");
    match event.severity {
      Severity::Low => info!(severity = %event.severity, component, user, "{}", event.message),
      Severity::Medium => warn!(severity = %event.severity, component, user, "{}", event.message),
      Severity::High | Severity::Critical => {
        error!(severity = %event.severity, component, user, "{}", event.message)
      }
    }

    // Snapshot so listeners may (un)subscribe from inside `on_log`.
    let listeners: Vec<Arc<dyn LogListener>> = self
      .listeners
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .entries
      .iter()
      .map(|(_, l)| Arc::clone(l))
      .collect();
    for listener in listeners {
      listener.on_log(&event);
    }
  }
}

/// Subscribe `service` to `logger` so every logged error is tracked.
pub fn initialize_error_tracking(
  logger: &ErrorLogger,
  service: Arc<ErrorTrackingService>,
) -> SubscriptionId {
  let id = logger.subscribe(service);
  info!("error tracking initialized");
  id
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::ErrorFilter;
  use std::sync::Mutex;

  #[derive(Default)]
  struct Recorder {
    seen: Mutex<Vec<String>>,
  }

  impl LogListener for Recorder {
    fn on_log(&self, event: &ErrorEvent) {
      self.seen.lock().unwrap().push(event.message.clone());
    }
  }

  #[test]
  fn logged_errors_reach_the_tracker() {
    let logger = ErrorLogger::new();
    let service = Arc::new(ErrorTrackingService::with_defaults());
    initialize_error_tracking(&logger, Arc::clone(&service));

    logger.log("boom", Severity::High, ErrorContext::new().with_component("Cart"));
    logger.log("boom", Severity::High, ErrorContext::new().with_user("u1"));

    let errors = service.errors(&ErrorFilter::default());
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].count, 2);
    assert!(errors[0].affected_components.contains("Cart"));
    assert!(errors[0].affected_users.contains("u1"));
  }

  #[test]
  fn unsubscribe_stops_delivery() {
    let logger = ErrorLogger::new();
    let recorder = Arc::new(Recorder::default());
    let id = logger.subscribe(recorder.clone());
    logger.log("one", Severity::Low, ErrorContext::new());
    assert!(logger.unsubscribe(id));
    assert!(!logger.unsubscribe(id));
    logger.log("two", Severity::Low, ErrorContext::new());
    assert_eq!(*recorder.seen.lock().unwrap(), vec!["one".to_string()]);
    assert_eq!(logger.listener_count(), 0);
  }

  #[test]
  fn log_error_records_source_chain() {
    #[derive(Debug, thiserror::Error)]
    #[error("payment failed")]
    struct Outer(#[source] std::io::Error);

    let logger = ErrorLogger::new();
    let service = Arc::new(ErrorTrackingService::with_defaults());
    initialize_error_tracking(&logger, Arc::clone(&service));

    let err = Outer(std::io::Error::new(std::io::ErrorKind::Other, "socket closed"));
    logger.log_error(&err, Severity::Critical, ErrorContext::new());

    let agg = &service.errors(&ErrorFilter::default())[0];
    assert_eq!(agg.message, "payment failed");
    assert_eq!(agg.stack.as_deref(), Some("caused by: socket closed"));
  }
}
