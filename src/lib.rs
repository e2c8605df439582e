//! # QMGate - Access-Controlled Gateway for Quality Management Backends
//!
//! Library core for exposing operations on a remote quality-management
//! backend as uniform, access-controlled tool invocations:
//! - Multi-endpoint connector with per-endpoint circuit breaking,
//!   version negotiation and failover
//! - Retry policy with exponential backoff and a retryability predicate
//! - Role-based permission checks and per-principal rate limiting
//! - Append-only audit trail with a queryable read side
//! - Tool pipeline orchestrating all of the above around a business handler
//!
//! ## Architecture
//!
//! Data flows one way per invocation:
//! ```text
//!   CallerContext + args → ToolPipeline
//!        │ authorize (PermissionChecker)
//!        │ rate-limit (RateLimiter)
//!        │ validate args (ToolRegistry)
//!        ▼
//!   handler → Connector → EndpointClient ⇄ CircuitBreaker
//!        │            └── RetryPolicy wraps each call
//!        ▼
//!   AuditLogger appends outcome; errors normalize to ErrorEnvelope
//! ```
//!
//! Business payload shapes and the transport that delivers tool
//! invocations are external collaborators, not part of this crate.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod access;
pub mod audit;
pub mod connector;
pub mod tools;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use types::{CallerContext, Config, Error, ErrorEnvelope, Result};
