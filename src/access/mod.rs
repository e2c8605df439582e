//! Access control: RBAC permission checks and per-principal rate limiting.

pub mod rate_limiter;
pub mod rbac;

pub use rate_limiter::{RateLimiter, ANONYMOUS_PRINCIPAL};
pub use rbac::PermissionChecker;
