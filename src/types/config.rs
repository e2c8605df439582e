//! Configuration structures.
//!
//! Configuration is supplied as data (YAML file or constructed in code) and
//! never mutated after load. Endpoints, credentials and the role table are
//! created once at startup; the components consume their own sections.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{Error, Result};
use crate::validation::{validate_non_empty, validate_positive};

/// Global gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identity and log verbosity.
    #[serde(default)]
    pub server: ServerConfig,

    /// Remote backend endpoints and credentials.
    pub backend: BackendConfig,

    /// Role table for the permission checker.
    #[serde(default = "default_roles")]
    pub roles: Vec<RoleDefinition>,

    /// Audit trail configuration.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Rate limiting and circuit breaking thresholds.
    #[serde(default)]
    pub security: SecurityConfig,
}

impl Config {
    /// Parse a YAML configuration document and validate it.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(contents)
            .map_err(|err| Error::validation(format!("invalid configuration: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Validate cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.backend.endpoints.is_empty() {
            return Err(Error::validation("at least one endpoint must be configured"));
        }
        for endpoint in &self.backend.endpoints {
            validate_non_empty(&endpoint.name, "endpoint name")?;
            validate_non_empty(&endpoint.base_url, "endpoint base_url")?;
        }
        validate_non_empty(&self.backend.default_endpoint, "default endpoint")?;
        if !self
            .backend
            .endpoints
            .iter()
            .any(|e| e.name == self.backend.default_endpoint)
        {
            return Err(Error::validation(format!(
                "default endpoint '{}' is not in the endpoint list",
                self.backend.default_endpoint
            )));
        }
        validate_positive(
            self.security.rate_limiting.max_requests,
            "rate limit max_requests",
        )?;
        validate_positive(
            self.security.circuit_breaker.failure_threshold,
            "circuit breaker failure_threshold",
        )?;
        Ok(())
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server name reported to clients.
    pub name: String,

    /// Tracing log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "qmgate".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Remote backend configuration: endpoints, credentials, version handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Configured endpoints (at least one).
    pub endpoints: Vec<Endpoint>,

    /// Name of the endpoint used when no explicit endpoint is requested.
    pub default_endpoint: String,

    /// Credentials shared by all endpoints.
    pub credentials: Credentials,

    /// API version negotiation settings.
    #[serde(default)]
    pub version_negotiation: VersionNegotiation,
}

/// One configured remote backend instance. Immutable after load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    /// Unique endpoint key.
    pub name: String,

    /// Transport kind the endpoint speaks.
    pub transport: TransportKind,

    /// Base address, e.g. `https://qm.example.com`.
    pub base_url: String,

    /// Declared API version, if known ahead of detection.
    #[serde(default)]
    pub api_version: Option<String>,

    /// Per-request timeout.
    #[serde(with = "humantime_serde", default = "default_endpoint_timeout")]
    pub timeout: Duration,

    /// Per-call retry budget for this endpoint.
    #[serde(default = "default_endpoint_retries")]
    pub retries: u32,
}

fn default_endpoint_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_endpoint_retries() -> u32 {
    3
}

/// Endpoint transport kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Rest,
    Soap,
}

/// Outbound credentials. Exactly one variant is active; auth headers (or the
/// SOAP security header) are derived from it once per client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Credentials {
    Basic {
        username: String,
        password: String,
    },
    Bearer {
        token: String,
    },
    ApiKey {
        api_key: String,
        #[serde(default = "default_api_key_header")]
        header: String,
    },
    /// WS-Security UsernameToken, embedded in SOAP envelope headers.
    #[serde(rename = "soap-wsse")]
    Wsse {
        username: String,
        password: String,
    },
}

fn default_api_key_header() -> String {
    "X-API-Key".to_string()
}

/// API version negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionNegotiation {
    /// Negotiate against `supported_versions`; plain detection when false.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Versions this deployment supports. Empty list accepts anything.
    #[serde(default)]
    pub supported_versions: Vec<String>,

    /// Last-resort version when detection and negotiation both fail.
    #[serde(default)]
    pub fallback_version: Option<String>,
}

impl Default for VersionNegotiation {
    fn default() -> Self {
        Self {
            enabled: true,
            supported_versions: Vec::new(),
            fallback_version: None,
        }
    }
}

fn default_true() -> bool {
    true
}

/// A named role granting a set of permission strings.
///
/// Permissions are `resource:action`, `resource:*`, or the global `*:*`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub name: String,
    pub permissions: Vec<String>,
}

/// Built-in role table, used when the configuration declares none.
pub fn default_roles() -> Vec<RoleDefinition> {
    vec![
        RoleDefinition {
            name: "Reader".to_string(),
            permissions: vec!["read:*".to_string()],
        },
        RoleDefinition {
            name: "QualityWriter".to_string(),
            permissions: vec![
                "read:*".to_string(),
                "write:actions".to_string(),
                "write:complaints".to_string(),
                "write:lots".to_string(),
            ],
        },
        RoleDefinition {
            name: "ProductionWriter".to_string(),
            permissions: vec!["read:*".to_string(), "write:lots".to_string()],
        },
        RoleDefinition {
            name: "AuditWriter".to_string(),
            permissions: vec!["read:*".to_string(), "write:audits".to_string()],
        },
        RoleDefinition {
            name: "Admin".to_string(),
            permissions: vec![
                "read:*".to_string(),
                "write:*".to_string(),
                "read:audit".to_string(),
            ],
        },
    ]
}

/// Audit trail configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Disable to skip all audit writes.
    pub enabled: bool,

    /// Directory holding the per-day JSONL files.
    pub log_path: PathBuf,

    /// Retention period for day files (enforced by external rotation).
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: PathBuf::from("./audit-logs"),
            retention_days: 365,
        }
    }
}

/// Security thresholds for rate limiting and circuit breaking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub rate_limiting: RateLimitConfig,

    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
}

/// Fixed-window rate limit thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Points per window per principal.
    pub max_requests: u32,

    /// Window length.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window: Duration::from_secs(60),
        }
    }
}

/// Circuit breaker thresholds, shared by every endpoint client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,

    /// Cooldown before an OPEN breaker allows a trial call.
    #[serde(with = "humantime_serde")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_yaml() -> &'static str {
        r#"
backend:
  endpoints:
    - name: primary
      transport: rest
      base_url: https://qm.example.com
  default_endpoint: primary
  credentials:
    type: basic
    username: svc
    password: secret
"#
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let config = Config::from_yaml_str(minimal_yaml()).unwrap();
        assert_eq!(config.server.name, "qmgate");
        assert_eq!(config.backend.endpoints[0].timeout, Duration::from_secs(30));
        assert_eq!(config.backend.endpoints[0].retries, 3);
        assert!(config.backend.version_negotiation.enabled);
        assert_eq!(config.security.rate_limiting.max_requests, 100);
        assert_eq!(config.security.circuit_breaker.failure_threshold, 5);
        assert!(config.roles.iter().any(|r| r.name == "Admin"));
    }

    #[test]
    fn test_credentials_variant_tagging() {
        let yaml = r#"
type: api-key
api_key: abc123
"#;
        let creds: Credentials = serde_yaml::from_str(yaml).unwrap();
        match creds {
            Credentials::ApiKey { api_key, header } => {
                assert_eq!(api_key, "abc123");
                assert_eq!(header, "X-API-Key");
            }
            other => panic!("unexpected variant: {other:?}"),
        }

        let wsse: Credentials =
            serde_yaml::from_str("type: soap-wsse\nusername: u\npassword: p\n").unwrap();
        assert!(matches!(wsse, Credentials::Wsse { .. }));
    }

    #[test]
    fn test_unknown_default_endpoint_rejected() {
        let yaml = r#"
backend:
  endpoints:
    - name: primary
      transport: rest
      base_url: https://qm.example.com
  default_endpoint: missing
  credentials:
    type: bearer
    token: tok
"#;
        let err = Config::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("default endpoint"));
    }

    #[test]
    fn test_empty_endpoint_list_rejected() {
        let yaml = r#"
backend:
  endpoints: []
  default_endpoint: primary
  credentials:
    type: bearer
    token: tok
"#;
        assert!(Config::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_duration_fields_use_humantime() {
        let yaml = r#"
backend:
  endpoints:
    - name: primary
      transport: soap
      base_url: https://qm.example.com/soap
      timeout: 5s
  default_endpoint: primary
  credentials:
    type: soap-wsse
    username: u
    password: p
security:
  rate_limiting:
    max_requests: 10
    window: 1m
  circuit_breaker:
    failure_threshold: 3
    reset_timeout: 500ms
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.backend.endpoints[0].timeout, Duration::from_secs(5));
        assert_eq!(config.security.rate_limiting.window, Duration::from_secs(60));
        assert_eq!(
            config.security.circuit_breaker.reset_timeout,
            Duration::from_millis(500)
        );
    }
}
