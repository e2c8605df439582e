//! Multi-endpoint connector to the remote backend.
//!
//! Owns one [`EndpointClient`] per configured endpoint and provides lookup,
//! failover and version negotiation over them. Registration order is the
//! failover preference order.

pub mod breaker;
pub mod client;
pub mod retry;

pub use breaker::{CircuitBreaker, CircuitState};
pub use client::{EndpointClient, DEFAULT_API_VERSION};
pub use retry::{default_retryable, RetryPolicy};

use std::sync::Arc;

use crate::types::config::{BackendConfig, CircuitBreakerConfig, VersionNegotiation};
use crate::types::{Error, Result};

/// Registry of endpoint clients with failover and version negotiation.
#[derive(Debug)]
pub struct Connector {
    clients: Vec<Arc<EndpointClient>>,
    default_index: usize,
    negotiation: VersionNegotiation,
}

impl Connector {
    /// Build clients for every configured endpoint.
    ///
    /// An endpoint whose client cannot be constructed is skipped with an
    /// error log; construction only fails outright when the default endpoint
    /// ends up unavailable.
    pub fn new(backend: &BackendConfig, breaker_config: &CircuitBreakerConfig) -> Result<Self> {
        let mut clients = Vec::with_capacity(backend.endpoints.len());
        for endpoint in &backend.endpoints {
            match EndpointClient::new(
                endpoint.clone(),
                backend.credentials.clone(),
                breaker_config,
                backend.version_negotiation.fallback_version.clone(),
            ) {
                Ok(client) => clients.push(Arc::new(client)),
                Err(err) => {
                    tracing::error!(
                        endpoint = %endpoint.name,
                        error = %err,
                        "skipping endpoint, client construction failed"
                    );
                }
            }
        }

        let default_index = clients
            .iter()
            .position(|client| client.name() == backend.default_endpoint)
            .ok_or_else(|| {
                Error::validation(format!(
                    "default endpoint '{}' is not available",
                    backend.default_endpoint
                ))
            })?;

        Ok(Self {
            clients,
            default_index,
            negotiation: backend.version_negotiation.clone(),
        })
    }

    /// Resolve an endpoint client by name.
    ///
    /// `None` and unknown names both resolve to the default endpoint; an
    /// unknown name additionally logs a warning.
    pub fn get_client(&self, name: Option<&str>) -> Arc<EndpointClient> {
        match name {
            None => Arc::clone(&self.clients[self.default_index]),
            Some(wanted) => match self.clients.iter().find(|c| c.name() == wanted) {
                Some(client) => Arc::clone(client),
                None => {
                    tracing::warn!(
                        endpoint = wanted,
                        "unknown endpoint requested, using default"
                    );
                    Arc::clone(&self.clients[self.default_index])
                }
            },
        }
    }

    /// All registered clients, in registration (failover preference) order.
    pub fn clients(&self) -> &[Arc<EndpointClient>] {
        &self.clients
    }

    /// Pick a working endpoint, preferring the named one.
    ///
    /// The named (or default, if unknown) client is returned as-is unless its
    /// breaker is OPEN, in which case registration order is scanned for the
    /// first alternative whose breaker is not OPEN. When every endpoint is
    /// broken the original client is returned anyway; its breaker will fail
    /// the call fast.
    pub fn fallback_to_secondary(&self, name: &str) -> Arc<EndpointClient> {
        let requested = self.get_client(Some(name));
        if requested.circuit_state() != CircuitState::Open {
            return requested;
        }

        match self.clients.iter().find(|client| {
            client.name() != requested.name() && client.circuit_state() != CircuitState::Open
        }) {
            Some(alternative) => {
                tracing::warn!(
                    from = %requested.name(),
                    to = %alternative.name(),
                    "endpoint circuit open, failing over"
                );
                Arc::clone(alternative)
            }
            None => requested,
        }
    }

    /// Negotiate the API version for the named (or default) endpoint.
    ///
    /// When negotiation is disabled this reduces to plain detection.
    pub async fn negotiate_version(&self, endpoint: Option<&str>) -> Result<String> {
        let client = self.get_client(endpoint);
        if !self.negotiation.enabled {
            return client.detect_version().await;
        }
        client
            .negotiate_version(&self.negotiation.supported_versions)
            .await
    }
}
