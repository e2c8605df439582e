//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation and provide
//! clear error messages with context. At the pipeline boundary every error is
//! normalized into an [`ErrorEnvelope`] with a stable machine-readable kind.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error enum for the gateway.
#[derive(Error, Debug)]
pub enum Error {
    /// Bad arguments or usage errors (raised before any network attempt).
    #[error("validation error: {0}")]
    Validation(String),

    /// Credential rejection by the remote endpoint.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Permission denied locally by the RBAC layer.
    #[error("authorization denied: {0}")]
    Authorization(String),

    /// Resource absent (unknown tool or missing remote entity).
    #[error("not found: {0}")]
    NotFound(String),

    /// Request quota exceeded; carries whole seconds until the window resets.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Endpoint currently short-circuited by its breaker.
    #[error("circuit breaker open: {0}")]
    CircuitOpen(String),

    /// Remote endpoint returned an error status/body.
    #[error("upstream API error (status {status}): {message}")]
    UpstreamApi {
        status: u16,
        message: String,
        details: Option<Value>,
    },

    /// Transport-level failure (connection refused, reset, DNS).
    #[error("network error: {0}")]
    Network(String),

    /// Request deadline exceeded.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything unclassified.
    #[error("unknown error: {0}")]
    Unknown(String),
}

// Convenience constructors
impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn authorization(msg: impl Into<String>) -> Self {
        Self::Authorization(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    pub fn circuit_open(msg: impl Into<String>) -> Self {
        Self::CircuitOpen(msg.into())
    }

    pub fn upstream(status: u16, msg: impl Into<String>) -> Self {
        Self::UpstreamApi {
            status,
            message: msg.into(),
            details: None,
        }
    }

    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::Unknown(msg.into())
    }

    /// Stable machine-readable kind string for the external envelope.
    ///
    /// Transport-level failures surface as `upstream_api`; internal
    /// serialization/io errors stay unclassified.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Validation(_) => "validation",
            Error::Authentication(_) => "authentication",
            Error::Authorization(_) => "authorization",
            Error::NotFound(_) => "not_found",
            Error::RateLimited { .. } => "rate_limited",
            Error::CircuitOpen(_) => "circuit_open",
            Error::UpstreamApi { .. } | Error::Network(_) | Error::Timeout(_) => "upstream_api",
            Error::Serialization(_) | Error::Io(_) | Error::Unknown(_) => "unknown",
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(err.to_string())
        } else if err.is_connect() {
            Error::Network(err.to_string())
        } else if let Some(status) = err.status() {
            Error::upstream(status.as_u16(), err.to_string())
        } else {
            Error::Network(err.to_string())
        }
    }
}

/// Uniform external error envelope returned at the pipeline boundary.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorEnvelope {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<Error> for ErrorEnvelope {
    fn from(err: Error) -> Self {
        let kind = err.kind();
        let details = match &err {
            Error::RateLimited { retry_after_secs } => {
                Some(serde_json::json!({ "retryAfter": retry_after_secs }))
            }
            Error::UpstreamApi {
                status, details, ..
            } => {
                let mut map = serde_json::Map::new();
                map.insert("status".to_string(), Value::from(*status));
                if let Some(body) = details {
                    map.insert("body".to_string(), body.clone());
                }
                Some(Value::Object(map))
            }
            _ => None,
        };

        ErrorEnvelope {
            kind,
            message: err.to_string(),
            details,
        }
    }
}
