//! Append-only audit trail: write side (logger) and read side (query).

pub mod logger;
pub mod query;

pub use logger::{AuditLogEntry, AuditLogger, AuditResult, Operation};
pub use query::{AuditQuery, AuditQueryFilter, AuditQueryPage};
