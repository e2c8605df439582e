//! Tool registry.
//!
//! A tool is a named operation with a declared parameter list, a required
//! permission, an operation class (read or write), and an async handler.
//! Registration is done once at startup; lookups afterwards are read-only.

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::audit::Operation;
use crate::types::{CallerContext, Error, Result};

// ===== Parameter declarations =====

/// Declared JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Number => value.is_number(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

/// One declared tool parameter.
#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
    /// Filled in when the caller omits an optional parameter.
    pub default: Option<Value>,
}

impl ParamDef {
    pub fn required(name: &str, description: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, description: &str, param_type: ParamType) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            param_type,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

// ===== Tool specification =====

/// Async tool handler: validated arguments plus caller context in, JSON out.
pub type ToolHandler =
    Arc<dyn Fn(Value, CallerContext) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Best-effort pre-write fetch of the entity's current state, for the audit
/// trail's `before` snapshot.
pub type BeforeFetch = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value>> + Send + Sync>;

/// Complete specification of one registered tool.
#[derive(Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParamDef>,
    pub operation: Operation,
    /// Permission string, `resource:action` form.
    pub required_permission: String,
    /// Entity classification recorded in the audit trail.
    pub entity_type: Option<String>,
    /// Argument name holding the audited entity's identifier.
    pub entity_id_param: Option<String>,
    pub handler: ToolHandler,
    pub before_fetch: Option<BeforeFetch>,
}

impl fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolSpec")
            .field("name", &self.name)
            .field("operation", &self.operation)
            .field("required_permission", &self.required_permission)
            .field("parameters", &self.parameters.len())
            .finish_non_exhaustive()
    }
}

impl ToolSpec {
    pub fn new(
        name: &str,
        description: &str,
        operation: Operation,
        required_permission: &str,
        handler: ToolHandler,
    ) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters: Vec::new(),
            operation,
            required_permission: required_permission.to_string(),
            entity_type: None,
            entity_id_param: None,
            handler,
            before_fetch: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<ParamDef>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn with_entity_type(mut self, entity_type: &str) -> Self {
        self.entity_type = Some(entity_type.to_string());
        self
    }

    pub fn with_entity_id_param(mut self, param: &str) -> Self {
        self.entity_id_param = Some(param.to_string());
        self
    }

    pub fn with_before_fetch(mut self, before_fetch: BeforeFetch) -> Self {
        self.before_fetch = Some(before_fetch);
        self
    }

    /// Check the supplied arguments against the declared parameters.
    ///
    /// Returns every problem found, not just the first: missing required
    /// parameters, type mismatches, and arguments that were never declared.
    pub fn validate_params(&self, args: &Value) -> Vec<String> {
        let mut issues = Vec::new();

        let empty = Map::new();
        let map = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                issues.push(format!("arguments must be an object, got {other}"));
                return issues;
            }
        };

        for param in &self.parameters {
            match map.get(&param.name) {
                Some(value) => {
                    if !param.param_type.accepts(value) {
                        issues.push(format!(
                            "parameter '{}' must be a {}",
                            param.name,
                            param.param_type.name()
                        ));
                    }
                }
                None => {
                    if param.required {
                        issues.push(format!("missing required parameter '{}'", param.name));
                    }
                }
            }
        }

        for key in map.keys() {
            if !self.parameters.iter().any(|p| p.name == *key) {
                issues.push(format!("unknown parameter '{key}'"));
            }
        }

        issues
    }

    /// Insert declared defaults for omitted optional parameters.
    pub fn fill_defaults(&self, args: Value) -> Value {
        let mut map = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for param in &self.parameters {
            if let Some(default) = &param.default {
                map.entry(param.name.clone())
                    .or_insert_with(|| default.clone());
            }
        }
        Value::Object(map)
    }
}

// ===== Registry =====

/// Name-keyed collection of tool specifications.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<ToolSpec>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. Re-registering a name replaces the previous entry
    /// with a warning.
    pub fn register(&mut self, spec: ToolSpec) -> Result<()> {
        if spec.name.is_empty() {
            return Err(Error::validation("tool name cannot be empty"));
        }
        if self.tools.contains_key(&spec.name) {
            tracing::warn!(tool = %spec.name, "replacing previously registered tool");
        }
        self.tools.insert(spec.name.clone(), Arc::new(spec));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<ToolSpec>> {
        self.tools.get(name).map(Arc::clone)
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered tool names, sorted for stable listings.
    pub fn list_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
