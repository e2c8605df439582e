//! Read side of the audit trail.
//!
//! Scans the per-day JSONL files, filters entries in memory, and returns a
//! page sorted newest-first. Pagination is applied to the sorted result set,
//! so a given (offset, limit) is stable across scan order. Malformed lines
//! are skipped with a warning; the trail remains queryable even when a
//! partial write corrupted a line.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;

use crate::audit::logger::{AuditLogEntry, Operation};
use crate::types::Result;

/// Filter for audit trail queries. All criteria are conjunctive.
#[derive(Debug, Clone)]
pub struct AuditQueryFilter {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub user_id: Option<String>,
    pub tool: Option<String>,
    pub operation: Option<Operation>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for AuditQueryFilter {
    fn default() -> Self {
        Self {
            start_date: None,
            end_date: None,
            user_id: None,
            tool: None,
            operation: None,
            entity_type: None,
            entity_id: None,
            limit: 100,
            offset: 0,
        }
    }
}

impl AuditQueryFilter {
    fn matches(&self, entry: &AuditLogEntry) -> bool {
        if let Some(start) = self.start_date {
            if entry.timestamp < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if entry.timestamp > end {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if entry.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(tool) = &self.tool {
            if entry.tool != *tool {
                return false;
            }
        }
        if let Some(operation) = self.operation {
            if entry.operation != operation {
                return false;
            }
        }
        if let Some(entity_type) = &self.entity_type {
            if entry.entity_type.as_deref() != Some(entity_type.as_str()) {
                return false;
            }
        }
        if let Some(entity_id) = &self.entity_id {
            if entry.entity_id.as_deref() != Some(entity_id.as_str()) {
                return false;
            }
        }
        true
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryPage {
    pub entries: Vec<AuditLogEntry>,
    /// Total matches before pagination.
    pub total: usize,
}

/// Queries the audit trail directory written by the logger.
#[derive(Debug, Clone)]
pub struct AuditQuery {
    log_dir: PathBuf,
}

impl AuditQuery {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            log_dir: log_dir.into(),
        }
    }

    /// Run a filtered query over every day file.
    ///
    /// A missing trail directory yields an empty page rather than an error.
    pub async fn query(&self, filter: &AuditQueryFilter) -> Result<AuditQueryPage> {
        let mut matches = Vec::new();

        let mut dir = match tokio::fs::read_dir(&self.log_dir).await {
            Ok(dir) => dir,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AuditQueryPage {
                    entries: Vec::new(),
                    total: 0,
                });
            }
            Err(err) => return Err(err.into()),
        };

        while let Some(dir_entry) = dir.next_entry().await? {
            let file_name = dir_entry.file_name();
            let name = file_name.to_string_lossy();
            if !name.starts_with("audit-") || !name.ends_with(".jsonl") {
                continue;
            }

            let contents = tokio::fs::read_to_string(dir_entry.path()).await?;
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<AuditLogEntry>(line) {
                    Ok(entry) => {
                        if filter.matches(&entry) {
                            matches.push(entry);
                        }
                    }
                    Err(err) => {
                        tracing::warn!(
                            file = %name,
                            error = %err,
                            "skipping malformed audit line"
                        );
                    }
                }
            }
        }

        let total = matches.len();
        matches.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

        let entries = matches
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .collect();

        Ok(AuditQueryPage { entries, total })
    }
}
