//! Stable signature computation for deduplicating events into aggregates.

use crate::types::{ErrorEvent, Severity, Signature};

/// Compute the dedup signature of an event.
///
/// Key components: message + severity. Context and stack never take part.
pub fn compute(event: &ErrorEvent) -> Signature {
  compute_parts(&event.message, event.severity)
}

/// Signature for a raw message/severity pair.
pub fn compute_parts(message: &str, severity: Severity) -> Signature {
  let mut hasher = blake3::Hasher::new();
  hasher.update(severity.as_str().as_bytes());
  hasher.update(b"|");
  hasher.update(message.as_bytes());

  // First 16 bytes (32 hex chars) keep the key compact.
  let hex = hasher.finalize().to_hex();
  Signature(hex[..32].to_string())
}
