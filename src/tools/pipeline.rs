//! Tool invocation pipeline.
//!
//! Every invocation passes the same gauntlet: tool lookup, permission check,
//! rate limit, argument validation, then the handler. Writes additionally get
//! a best-effort pre-fetch of the entity's current state for the audit
//! trail's `before` snapshot. The outcome is audited whether the handler
//! succeeded or failed; denials raised before execution (authorization, rate
//! limit) are not audited since nothing was attempted.

use chrono::Utc;
use serde_json::Value;

use crate::access::{PermissionChecker, RateLimiter};
use crate::audit::{AuditLogEntry, AuditLogger, AuditResult, Operation};
use crate::tools::registry::{ToolRegistry, ToolSpec};
use crate::types::{CallerContext, Config, Error, ErrorEnvelope, Result};

/// Runs registered tools through access control, validation and auditing.
#[derive(Debug)]
pub struct ToolPipeline {
    registry: ToolRegistry,
    permissions: PermissionChecker,
    rate_limiter: RateLimiter,
    audit: AuditLogger,
}

impl ToolPipeline {
    pub fn new(registry: ToolRegistry, config: &Config) -> Self {
        Self {
            registry,
            permissions: PermissionChecker::from_roles(&config.roles),
            rate_limiter: RateLimiter::new(&config.security.rate_limiting),
            audit: AuditLogger::new(&config.audit),
        }
    }

    /// The registry backing this pipeline.
    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Invoke a tool, normalizing any failure into the external envelope.
    pub async fn dispatch(
        &self,
        tool_name: &str,
        args: Value,
        ctx: &CallerContext,
    ) -> std::result::Result<Value, ErrorEnvelope> {
        self.invoke(tool_name, args, ctx)
            .await
            .map_err(ErrorEnvelope::from)
    }

    /// Invoke a tool, returning the raw error for in-process callers.
    pub async fn invoke(&self, tool_name: &str, args: Value, ctx: &CallerContext) -> Result<Value> {
        let spec = self
            .registry
            .get(tool_name)
            .ok_or_else(|| Error::not_found(format!("unknown tool '{tool_name}'")))?;

        self.permissions
            .check(&ctx.roles, &spec.required_permission)?;
        self.rate_limiter.check_limit(ctx.user_id.as_deref())?;

        let issues = spec.validate_params(&args);
        if !issues.is_empty() {
            return Err(Error::validation(issues.join("; ")));
        }
        let args = spec.fill_defaults(args);

        let before = self.fetch_before(&spec, &args).await;

        tracing::info!(
            tool = %spec.name,
            user = ctx.user_id.as_deref().unwrap_or("anonymous"),
            operation = ?spec.operation,
            "invoking tool"
        );

        let outcome = (spec.handler)(args.clone(), ctx.clone()).await;

        self.audit_outcome(&spec, &args, ctx, before, &outcome).await;
        outcome
    }

    /// Best-effort snapshot of the entity before a write. Fetch failures are
    /// logged and ignored so a broken read never blocks the write itself.
    async fn fetch_before(&self, spec: &ToolSpec, args: &Value) -> Option<Value> {
        if spec.operation != Operation::Write {
            return None;
        }
        let fetch = spec.before_fetch.as_ref()?;
        match fetch(args.clone()).await {
            Ok(state) => Some(state),
            Err(err) => {
                tracing::warn!(
                    tool = %spec.name,
                    error = %err,
                    "pre-write entity fetch failed, auditing without before snapshot"
                );
                None
            }
        }
    }

    async fn audit_outcome(
        &self,
        spec: &ToolSpec,
        args: &Value,
        ctx: &CallerContext,
        before: Option<Value>,
        outcome: &Result<Value>,
    ) {
        let entity_id = spec
            .entity_id_param
            .as_ref()
            .and_then(|param| args.get(param))
            .and_then(Value::as_str)
            .map(str::to_string);

        let (result, after, error) = match outcome {
            Ok(value) => {
                let after = (spec.operation == Operation::Write).then(|| value.clone());
                (AuditResult::Success, after, None)
            }
            Err(err) => (AuditResult::Failure, None, Some(err.to_string())),
        };

        // Reads carry a result count instead of snapshots.
        let metadata = match outcome {
            Ok(Value::Array(items)) if spec.operation == Operation::Read => {
                Some(serde_json::json!({ "resultCount": items.len() }))
            }
            _ => None,
        };

        self.audit
            .log(AuditLogEntry {
                timestamp: Utc::now(),
                user_id: ctx.user_id.clone(),
                user_roles: ctx.roles.clone(),
                tool: spec.name.clone(),
                operation: spec.operation,
                entity_type: spec.entity_type.clone(),
                entity_id,
                arguments: args.clone(),
                before,
                after,
                result,
                error,
                metadata,
            })
            .await;
    }
}
