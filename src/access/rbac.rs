//! Role-based permission checks.
//!
//! Roles map to permission strings of the form `resource:action`. A check
//! passes when the union of the caller's role permissions contains the exact
//! permission, the resource wildcard `resource:*`, or the global `*:*`.
//! Unknown role names contribute nothing; a caller with no roles at all is
//! always denied.

use std::collections::{HashMap, HashSet};

use crate::types::config::RoleDefinition;
use crate::types::{Error, Result};

/// Checks required permissions against a fixed role table.
#[derive(Debug, Clone)]
pub struct PermissionChecker {
    roles: HashMap<String, HashSet<String>>,
}

impl PermissionChecker {
    /// Build the checker from the configured role table.
    pub fn from_roles(definitions: &[RoleDefinition]) -> Self {
        let roles = definitions
            .iter()
            .map(|role| {
                (
                    role.name.clone(),
                    role.permissions.iter().cloned().collect(),
                )
            })
            .collect();
        Self { roles }
    }

    /// Verify that the caller's roles grant `required`.
    pub fn check(&self, role_names: &[String], required: &str) -> Result<()> {
        if role_names.is_empty() {
            return Err(Error::authorization("no roles assigned"));
        }

        let granted = self.permissions_for(role_names);
        if Self::grants(&granted, required) {
            return Ok(());
        }

        tracing::debug!(
            roles = ?role_names,
            required,
            "permission denied"
        );
        Err(Error::authorization(format!(
            "permission '{required}' not granted by roles {role_names:?}"
        )))
    }

    /// Union of permission strings granted by the named roles.
    ///
    /// Unknown role names are ignored.
    pub fn permissions_for(&self, role_names: &[String]) -> HashSet<String> {
        let mut granted = HashSet::new();
        for name in role_names {
            if let Some(permissions) = self.roles.get(name) {
                granted.extend(permissions.iter().cloned());
            }
        }
        granted
    }

    fn grants(granted: &HashSet<String>, required: &str) -> bool {
        if granted.contains(required) || granted.contains("*:*") {
            return true;
        }
        match required.split_once(':') {
            Some((resource, _)) => granted.contains(&format!("{resource}:*")),
            None => false,
        }
    }
}
