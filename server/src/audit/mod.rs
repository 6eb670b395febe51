//! Append-only audit trail.
//!
//! Every state change, engine command, error, batch run, drift repair and
//! session event is recorded as an [`AuditEntry`]. The log keeps a bounded
//! window in memory and persists it as formatted text lines.

mod entry;
mod log;

pub use entry::{AuditCategory, AuditEntry};
pub use log::{AuditLog, AuditLogOptions, AuditQuery, MAX_RETENTION_DAYS};
