//! Endpoint client — one authenticated transport binding to one endpoint.
//!
//! Every call routes through the endpoint's circuit breaker. REST endpoints
//! expose verb methods; SOAP endpoints expose a single `call` posting a
//! SOAP 1.1 envelope. Transport mismatch is a usage error, never a
//! retryable fault. API version is detected lazily and cached for the
//! client's lifetime.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::connector::breaker::{CircuitBreaker, CircuitState};
use crate::types::config::{CircuitBreakerConfig, Credentials, Endpoint, TransportKind};
use crate::types::{Error, Result};

/// Hardcoded last-resort API version.
pub const DEFAULT_API_VERSION: &str = "v1";

/// Path probed on REST endpoints during version detection.
const VERSION_PROBE_PATH: &str = "/api/version";

/// Header carrying the negotiated API version on every REST request once
/// detection has run.
const API_VERSION_HEADER: &str = "X-API-Version";

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: Option<String>,
}

/// One authenticated transport binding to one endpoint.
#[derive(Debug)]
pub struct EndpointClient {
    endpoint: Endpoint,
    credentials: Credentials,
    fallback_version: Option<String>,
    http: reqwest::Client,
    breaker: CircuitBreaker,
    detected_version: Mutex<Option<String>>,
}

impl EndpointClient {
    /// Build a client for `endpoint`, deriving auth headers once from the
    /// active credentials variant.
    pub fn new(
        endpoint: Endpoint,
        credentials: Credentials,
        breaker_config: &CircuitBreakerConfig,
        fallback_version: Option<String>,
    ) -> Result<Self> {
        let headers = auth_headers(&credentials)?;
        let http = reqwest::Client::builder()
            .timeout(endpoint.timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| Error::unknown(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            endpoint,
            credentials,
            fallback_version,
            http,
            breaker: CircuitBreaker::new(breaker_config),
            detected_version: Mutex::new(None),
        })
    }

    /// Endpoint key this client is bound to.
    pub fn name(&self) -> &str {
        &self.endpoint.name
    }

    /// The endpoint configuration this client was built from.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// The client's circuit breaker (state inspection, administrative reset).
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Current breaker state.
    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// Version cached by a previous detection, if any.
    pub fn detected_version(&self) -> Option<String> {
        self.lock_version().clone()
    }

    pub async fn get(&self, path: &str, query: Option<&Value>) -> Result<Value> {
        self.ensure_rest("GET")?;
        let url = self.url(path);
        self.breaker
            .execute(|| async {
                let mut request = self.versioned(self.http.get(url.as_str()));
                if let Some(params) = query {
                    request = request.query(params);
                }
                let response = request.send().await?;
                Self::read_json_response(path, response).await
            })
            .await
    }

    pub async fn post(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        self.ensure_rest("POST")?;
        let url = self.url(path);
        self.breaker
            .execute(|| async {
                let mut request = self.versioned(self.http.post(url.as_str()));
                if let Some(payload) = body {
                    request = request.json(payload);
                }
                let response = request.send().await?;
                Self::read_json_response(path, response).await
            })
            .await
    }

    pub async fn put(&self, path: &str, body: Option<&Value>) -> Result<Value> {
        self.ensure_rest("PUT")?;
        let url = self.url(path);
        self.breaker
            .execute(|| async {
                let mut request = self.versioned(self.http.put(url.as_str()));
                if let Some(payload) = body {
                    request = request.json(payload);
                }
                let response = request.send().await?;
                Self::read_json_response(path, response).await
            })
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.ensure_rest("DELETE")?;
        let url = self.url(path);
        self.breaker
            .execute(|| async {
                let request = self.versioned(self.http.delete(url.as_str()));
                let response = request.send().await?;
                Self::read_json_response(path, response).await
            })
            .await
    }

    /// Invoke a SOAP action with the given body fields.
    ///
    /// Returns the raw response document as a JSON string value; parsing the
    /// result envelope is left to the caller.
    pub async fn call(&self, action: &str, body: &Value) -> Result<Value> {
        if self.endpoint.transport != TransportKind::Soap {
            return Err(Error::validation(format!(
                "call() requires a SOAP endpoint; '{}' is REST",
                self.endpoint.name
            )));
        }

        let envelope = self.build_soap_envelope(action, body)?;
        let soap_action = format!("\"{action}\"");
        self.breaker
            .execute(|| async {
                let response = self
                    .http
                    .post(self.endpoint.base_url.as_str())
                    .header(CONTENT_TYPE, "text/xml; charset=utf-8")
                    .header("SOAPAction", soap_action.as_str())
                    .body(envelope.clone())
                    .send()
                    .await?;

                let status = response.status();
                let text = response.text().await?;
                if !status.is_success() {
                    return Err(Self::status_error(action, status, &text));
                }
                Ok(Value::String(text))
            })
            .await
    }

    /// Detect the endpoint's API version, caching the result.
    ///
    /// REST endpoints probe the version endpoint once; on any probe failure
    /// the configured version (or the hardcoded default) is used. SOAP
    /// endpoints skip the probe entirely.
    pub async fn detect_version(&self) -> Result<String> {
        if let Some(version) = self.lock_version().clone() {
            return Ok(version);
        }

        let version = if self.endpoint.transport == TransportKind::Soap {
            self.configured_version()
        } else {
            match self.probe_version().await {
                Ok(version) => version,
                Err(err) => {
                    tracing::warn!(
                        endpoint = %self.endpoint.name,
                        error = %err,
                        "version detection failed, using configured version"
                    );
                    self.configured_version()
                }
            }
        };

        *self.lock_version() = Some(version.clone());
        Ok(version)
    }

    /// Negotiate a version against the supported list.
    ///
    /// An empty list, or one containing the detected version, leaves the
    /// detected version unchanged. Otherwise the first supported version
    /// sharing the detected major component wins; failing that, the detected
    /// version is used and a warning is emitted.
    pub async fn negotiate_version(&self, supported_versions: &[String]) -> Result<String> {
        let detected = self.detect_version().await?;

        if supported_versions.is_empty() || supported_versions.contains(&detected) {
            return Ok(detected);
        }

        if let Some(compatible) = supported_versions
            .iter()
            .find(|candidate| same_major(&detected, candidate))
        {
            tracing::info!(
                endpoint = %self.endpoint.name,
                detected = %detected,
                using = %compatible,
                "version negotiation successful"
            );
            return Ok(compatible.clone());
        }

        tracing::warn!(
            endpoint = %self.endpoint.name,
            detected = %detected,
            supported = ?supported_versions,
            "version negotiation failed, using detected version"
        );
        Ok(detected)
    }

    fn configured_version(&self) -> String {
        self.endpoint
            .api_version
            .clone()
            .or_else(|| self.fallback_version.clone())
            .unwrap_or_else(|| DEFAULT_API_VERSION.to_string())
    }

    async fn probe_version(&self) -> Result<String> {
        let url = self.url(VERSION_PROBE_PATH);
        let response = self.http.get(url.as_str()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::upstream(
                status.as_u16(),
                "version endpoint returned an error",
            ));
        }
        let info: VersionInfo = response.json().await?;
        info.version
            .ok_or_else(|| Error::unknown("version endpoint returned no version"))
    }

    /// Stamp the cached API version onto an outgoing request, once known.
    fn versioned(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.lock_version().as_deref() {
            Some(version) => request.header(API_VERSION_HEADER, version),
            None => request,
        }
    }

    fn ensure_rest(&self, verb: &str) -> Result<()> {
        if self.endpoint.transport == TransportKind::Soap {
            return Err(Error::validation(format!(
                "{verb} not supported for SOAP endpoint '{}'; use call()",
                self.endpoint.name
            )));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        let base = self.endpoint.base_url.trim_end_matches('/');
        if path.starts_with('/') {
            format!("{base}{path}")
        } else {
            format!("{base}/{path}")
        }
    }

    async fn read_json_response(path: &str, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Err(Error::authentication("credentials rejected by endpoint"));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(Error::not_found(format!("resource not found: {path}")));
        }

        let text = response.text().await?;
        if !status.is_success() {
            return Err(Self::status_error(path, status, &text));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn status_error(context: &str, status: StatusCode, body: &str) -> Error {
        let details: Option<Value> = serde_json::from_str(body).ok();
        let message = details
            .as_ref()
            .and_then(|value| value.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| format!("{context}: {}", status.canonical_reason().unwrap_or("error")));
        Error::UpstreamApi {
            status: status.as_u16(),
            message,
            details,
        }
    }

    fn build_soap_envelope(&self, action: &str, body: &Value) -> Result<String> {
        let fields = body
            .as_object()
            .ok_or_else(|| Error::validation("SOAP body must be a JSON object"))?;

        let mut body_xml = String::new();
        for (key, value) in fields {
            let rendered = match value {
                Value::String(s) => xml_escape(s),
                other => xml_escape(&other.to_string()),
            };
            body_xml.push_str(&format!("<{key}>{rendered}</{key}>"));
        }

        let security = match &self.credentials {
            Credentials::Wsse { username, password } => format!(
                "<wsse:UsernameToken><wsse:Username>{}</wsse:Username>\
                 <wsse:Password>{}</wsse:Password></wsse:UsernameToken>",
                xml_escape(username),
                xml_escape(password)
            ),
            _ => String::new(),
        };

        Ok(format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
  <soap:Header>
    <wsse:Security xmlns:wsse="http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-wssecurity-secext-1.0.xsd">{security}</wsse:Security>
  </soap:Header>
  <soap:Body>
    <{action}>{body_xml}</{action}>
  </soap:Body>
</soap:Envelope>"#
        ))
    }

    fn lock_version(&self) -> MutexGuard<'_, Option<String>> {
        self.detected_version
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

/// Derive outbound auth headers from the active credentials variant.
///
/// WS-Security credentials produce no headers; they are embedded in the SOAP
/// envelope instead.
fn auth_headers(credentials: &Credentials) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    match credentials {
        Credentials::Basic { username, password } => {
            let encoded = BASE64.encode(format!("{username}:{password}"));
            headers.insert(AUTHORIZATION, header_value(&format!("Basic {encoded}"))?);
        }
        Credentials::Bearer { token } => {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
        Credentials::ApiKey { api_key, header } => {
            let name = HeaderName::from_bytes(header.as_bytes())
                .map_err(|_| Error::validation(format!("invalid API key header name: {header}")))?;
            headers.insert(name, header_value(api_key)?);
        }
        Credentials::Wsse { .. } => {}
    }
    Ok(headers)
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|_| Error::validation("credential contains invalid header characters"))
}

fn same_major(version: &str, candidate: &str) -> bool {
    version.split('.').next() == candidate.split('.').next()
}

fn xml_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
