//! Shared types: configuration, errors, caller identity.

pub mod config;
pub mod errors;

pub use config::Config;
pub use errors::{Error, ErrorEnvelope, Result};

/// Identity of the invoking principal, supplied with every tool invocation.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// Principal id; `None` is treated as the anonymous principal.
    pub user_id: Option<String>,

    /// Role names resolved against the configured role table.
    pub roles: Vec<String>,
}

impl CallerContext {
    pub fn new(user_id: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            roles,
        }
    }

    /// A caller with no identity and no roles.
    pub fn anonymous() -> Self {
        Self::default()
    }
}
