//! Built-in tools shipped with the gateway.
//!
//! The audit trail query tool exposes the read side of the trail to callers
//! holding `read:audit`; the health tool reports per-endpoint connection and
//! breaker state, audit trail status, and the registered tool count.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use crate::audit::{AuditQuery, AuditQueryFilter, Operation};
use crate::connector::{CircuitState, Connector};
use crate::tools::registry::{ParamDef, ParamType, ToolHandler, ToolRegistry, ToolSpec};
use crate::types::config::AuditConfig;
use crate::types::{Error, Result};

/// Register the `query_audit_logs` tool against the configured trail.
pub fn register_audit_query_tool(registry: &mut ToolRegistry, config: &AuditConfig) -> Result<()> {
    let query = AuditQuery::new(config.log_path.clone());

    let handler: ToolHandler = Arc::new(move |args: Value, _ctx| {
        let query = query.clone();
        Box::pin(async move {
            let filter = parse_filter(&args)?;
            let page = query.query(&filter).await?;
            Ok(serde_json::to_value(page)?)
        }) as futures::future::BoxFuture<'static, Result<Value>>
    });

    registry.register(
        ToolSpec::new(
            "query_audit_logs",
            "Search the audit trail with optional filters, newest entries first",
            Operation::Read,
            "read:audit",
            handler,
        )
        .with_parameters(vec![
            ParamDef::optional("startDate", "Earliest timestamp (RFC 3339)", ParamType::String),
            ParamDef::optional("endDate", "Latest timestamp (RFC 3339)", ParamType::String),
            ParamDef::optional("userId", "Filter by acting principal", ParamType::String),
            ParamDef::optional("tool", "Filter by tool name", ParamType::String),
            ParamDef::optional("operation", "Filter by operation (read or write)", ParamType::String),
            ParamDef::optional("entityType", "Filter by entity classification", ParamType::String),
            ParamDef::optional("entityId", "Filter by entity identifier", ParamType::String),
            ParamDef::optional("limit", "Maximum entries per page", ParamType::Integer)
                .with_default(Value::from(100)),
            ParamDef::optional("offset", "Entries to skip from the newest", ParamType::Integer)
                .with_default(Value::from(0)),
        ]),
    )
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthReport {
    status: &'static str,
    timestamp: DateTime<Utc>,
    endpoints: Vec<EndpointHealth>,
    audit: AuditHealth,
    tools: ToolsHealth,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EndpointHealth {
    name: String,
    status: &'static str,
    circuit_breaker: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AuditHealth {
    enabled: bool,
    log_path: PathBuf,
    status: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolsHealth {
    registered: usize,
    status: &'static str,
}

/// Register the `health_check` tool reporting connector, audit and registry
/// state. The reported tool count includes this tool itself, so register it
/// after the business tools.
pub fn register_health_tool(
    registry: &mut ToolRegistry,
    connector: Arc<Connector>,
    audit_config: &AuditConfig,
) -> Result<()> {
    let registered = registry.len() + 1;
    let audit_config = audit_config.clone();

    let handler: ToolHandler = Arc::new(move |_args: Value, _ctx| {
        let connector = Arc::clone(&connector);
        let audit_config = audit_config.clone();
        Box::pin(async move {
            let report = build_health_report(&connector, &audit_config, registered).await;
            Ok(serde_json::to_value(report)?)
        })
    });

    registry.register(ToolSpec::new(
        "health_check",
        "Report endpoint connection, circuit breaker, audit trail and tool registry status",
        Operation::Read,
        "read:health",
        handler,
    ))
}

async fn build_health_report(
    connector: &Connector,
    audit: &AuditConfig,
    registered: usize,
) -> HealthReport {
    let endpoints: Vec<EndpointHealth> = connector
        .clients()
        .iter()
        .map(|client| {
            let state = client.circuit_state();
            let status = match state {
                CircuitState::Closed => "connected",
                CircuitState::HalfOpen => "degraded",
                CircuitState::Open => "disconnected",
            };
            EndpointHealth {
                name: client.name().to_string(),
                status,
                circuit_breaker: state.as_str(),
                version: client.detected_version(),
            }
        })
        .collect();

    let audit_status = if !audit.enabled {
        "operational"
    } else {
        match tokio::fs::create_dir_all(&audit.log_path).await {
            Ok(()) => "operational",
            Err(err) => {
                tracing::warn!(error = %err, "audit trail directory is not writable");
                "error"
            }
        }
    };

    let status = if endpoints.iter().any(|e| e.status == "disconnected") {
        "unhealthy"
    } else if endpoints.iter().any(|e| e.status == "degraded") || audit_status == "error" {
        "degraded"
    } else {
        "healthy"
    };

    HealthReport {
        status,
        timestamp: Utc::now(),
        endpoints,
        audit: AuditHealth {
            enabled: audit.enabled,
            log_path: audit.log_path.clone(),
            status: audit_status,
        },
        tools: ToolsHealth {
            registered,
            status: "operational",
        },
    }
}

fn parse_filter(args: &Value) -> Result<AuditQueryFilter> {
    let mut filter = AuditQueryFilter {
        user_id: string_arg(args, "userId"),
        tool: string_arg(args, "tool"),
        entity_type: string_arg(args, "entityType"),
        entity_id: string_arg(args, "entityId"),
        ..Default::default()
    };

    if let Some(raw) = string_arg(args, "startDate") {
        filter.start_date = Some(parse_date("startDate", &raw)?);
    }
    if let Some(raw) = string_arg(args, "endDate") {
        filter.end_date = Some(parse_date("endDate", &raw)?);
    }
    if let Some(raw) = string_arg(args, "operation") {
        filter.operation = Some(match raw.as_str() {
            "read" => Operation::Read,
            "write" => Operation::Write,
            other => {
                return Err(Error::validation(format!(
                    "operation must be 'read' or 'write', got '{other}'"
                )))
            }
        });
    }
    if let Some(limit) = args.get("limit").and_then(Value::as_u64) {
        filter.limit = limit as usize;
    }
    if let Some(offset) = args.get("offset").and_then(Value::as_u64) {
        filter.offset = offset as usize;
    }

    Ok(filter)
}

fn string_arg(args: &Value, name: &str) -> Option<String> {
    args.get(name).and_then(Value::as_str).map(str::to_string)
}

fn parse_date(field: &str, raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| Error::validation(format!("{field} must be an RFC 3339 timestamp: '{raw}'")))
}
