//! Audit trail for destructive operations.
//!
//! Entries go out as structured `tracing` events on the `audit` target so
//! they can be routed separately (`RUST_LOG=audit=info`). Auditing never
//! fails the request that triggered it.

use serde_json::Value;

/// Emit one audit entry.
///
/// # Arguments
/// * `action`: Machine-readable action name (e.g. "deletion_executed").
/// * `details`: Arbitrary JSON payload with context (IDs, reasons, errors).
pub fn log_audit(action: &str, details: Value) {
    tracing::info!(
        target: "audit",
        action = %action,
        details = %details,
        at = %chrono::Utc::now().to_rfc3339(),
        "audit"
    );
}
