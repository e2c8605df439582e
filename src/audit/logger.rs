//! Append-only audit trail.
//!
//! Entries are serialized as one JSON object per line into a per-UTC-day
//! file `audit-YYYY-MM-DD.jsonl` under the configured directory. Audit
//! writes never fail the operation being audited: I/O errors are logged and
//! swallowed.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;

use crate::types::config::AuditConfig;
use crate::types::Result;

/// Operation class of an audited tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Read,
    Write,
}

/// Outcome of an audited tool invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditResult {
    Success,
    Failure,
}

/// One audit trail record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_roles: Vec<String>,

    pub tool: String,

    pub operation: Operation,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub arguments: serde_json::Value,

    /// Entity state fetched before a write, when available.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<serde_json::Value>,

    /// Entity state after a successful write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<serde_json::Value>,

    pub result: AuditResult,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Lightweight extras for reads (result counts and the like).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Appends audit records to per-day JSONL files.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    log_dir: PathBuf,
    enabled: bool,
}

impl AuditLogger {
    pub fn new(config: &AuditConfig) -> Self {
        Self {
            log_dir: config.log_path.clone(),
            enabled: config.enabled,
        }
    }

    /// Record an entry.
    ///
    /// Infallible by contract: a failed append is reported through tracing
    /// and otherwise ignored, so auditing never breaks the audited call.
    pub async fn log(&self, entry: AuditLogEntry) {
        if !self.enabled {
            return;
        }
        if let Err(err) = self.append(&entry).await {
            tracing::error!(
                tool = %entry.tool,
                error = %err,
                "failed to write audit log entry"
            );
        }
    }

    async fn append(&self, entry: &AuditLogEntry) -> Result<()> {
        tokio::fs::create_dir_all(&self.log_dir).await?;

        let file_name = format!("audit-{}.jsonl", entry.timestamp.format("%Y-%m-%d"));
        let path = self.log_dir.join(file_name);

        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
