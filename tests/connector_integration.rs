//! Connector integration tests against in-process HTTP servers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use qmgate::connector::{default_retryable, CircuitState, Connector, EndpointClient, RetryPolicy};
use qmgate::types::config::{
    BackendConfig, CircuitBreakerConfig, Credentials, Endpoint, TransportKind, VersionNegotiation,
};
use qmgate::types::Error;

async fn spawn_server(app: Router) -> String {
    qmgate::observability::init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// A loopback port that refuses connections: bind then immediately drop.
async fn refused_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

fn endpoint(name: &str, base_url: &str) -> Endpoint {
    Endpoint {
        name: name.to_string(),
        transport: TransportKind::Rest,
        base_url: base_url.to_string(),
        api_version: None,
        timeout: Duration::from_secs(5),
        retries: 3,
    }
}

fn bearer() -> Credentials {
    Credentials::Bearer {
        token: "test-token".to_string(),
    }
}

fn breaker_config(failure_threshold: u32) -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        enabled: true,
        failure_threshold,
        reset_timeout: Duration::from_millis(200),
    }
}

fn client(base_url: &str) -> EndpointClient {
    EndpointClient::new(
        endpoint("primary", base_url),
        bearer(),
        &breaker_config(5),
        None,
    )
    .unwrap()
}

#[tokio::test]
async fn test_rest_get_sends_auth_and_parses_json() {
    let app = Router::new().route(
        "/api/lots/{id}",
        get(|Path(id): Path<String>, headers: HeaderMap| async move {
            let auth = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_string();
            Json(json!({ "lotId": id, "auth": auth }))
        }),
    );
    let base = spawn_server(app).await;

    let client = client(&base);
    let value = client.get("/api/lots/L-42", None).await.unwrap();
    assert_eq!(value["lotId"], "L-42");
    assert_eq!(value["auth"], "Bearer test-token");
}

#[tokio::test]
async fn test_rest_post_sends_body() {
    let app = Router::new().route(
        "/api/lots",
        post(|Json(body): Json<Value>| async move {
            (StatusCode::CREATED, Json(json!({ "received": body })))
        }),
    );
    let base = spawn_server(app).await;

    let client = client(&base);
    let value = client
        .post("/api/lots", Some(&json!({ "lotId": "L-1", "quantity": 5 })))
        .await
        .unwrap();
    assert_eq!(value["received"]["lotId"], "L-1");
    assert_eq!(value["received"]["quantity"], 5);
}

#[tokio::test]
async fn test_empty_body_parses_as_null() {
    let app = Router::new().route(
        "/api/lots/{id}",
        delete(|Path(_id): Path<String>| async { StatusCode::NO_CONTENT }),
    );
    let base = spawn_server(app).await;

    let client = client(&base);
    let value = client.delete("/api/lots/L-1").await.unwrap();
    assert_eq!(value, Value::Null);
}

#[tokio::test]
async fn test_status_401_maps_to_authentication() {
    let app = Router::new().route(
        "/api/lots/{id}",
        get(|| async { (StatusCode::UNAUTHORIZED, Json(json!({"message": "bad token"}))) }),
    );
    let base = spawn_server(app).await;

    let err = client(&base).get("/api/lots/L-1", None).await.unwrap_err();
    assert!(matches!(err, Error::Authentication(_)));
}

#[tokio::test]
async fn test_status_404_maps_to_not_found() {
    let app = Router::new();
    let base = spawn_server(app).await;

    let err = client(&base).get("/api/lots/L-1", None).await.unwrap_err();
    match err {
        Error::NotFound(msg) => assert!(msg.contains("/api/lots/L-1")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_status_500_carries_body_and_message() {
    let app = Router::new().route(
        "/api/lots",
        get(|| async {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"message": "backend exploded", "code": "QM-500"})),
            )
        }),
    );
    let base = spawn_server(app).await;

    let err = client(&base).get("/api/lots", None).await.unwrap_err();
    match err {
        Error::UpstreamApi {
            status,
            message,
            details,
        } => {
            assert_eq!(status, 500);
            assert_eq!(message, "backend exploded");
            assert_eq!(details.unwrap()["code"], "QM-500");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_version_detected_once_and_cached() {
    let probes = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route(
            "/api/version",
            get(|State(probes): State<Arc<AtomicU32>>| async move {
                probes.fetch_add(1, Ordering::SeqCst);
                Json(json!({"version": "2.1"}))
            }),
        )
        .with_state(Arc::clone(&probes));
    let base = spawn_server(app).await;

    let client = client(&base);
    assert_eq!(client.detect_version().await.unwrap(), "2.1");
    assert_eq!(client.detect_version().await.unwrap(), "2.1");
    assert_eq!(probes.load(Ordering::SeqCst), 1);
    assert_eq!(client.detected_version(), Some("2.1".to_string()));
}

#[tokio::test]
async fn test_detected_version_sent_as_request_header() {
    let app = Router::new()
        .route(
            "/api/version",
            get(|| async { Json(json!({"version": "2.1"})) }),
        )
        .route(
            "/api/lots",
            get(|headers: HeaderMap| async move {
                let version = headers
                    .get("x-api-version")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Json(json!({ "apiVersion": version }))
            }),
        );
    let base = spawn_server(app).await;

    let client = client(&base);

    // Before detection no version header is attached.
    let value = client.get("/api/lots", None).await.unwrap();
    assert_eq!(value["apiVersion"], Value::Null);

    // Once detected, every request carries the version.
    client.detect_version().await.unwrap();
    let value = client.get("/api/lots", None).await.unwrap();
    assert_eq!(value["apiVersion"], "2.1");
}

#[tokio::test]
async fn test_probe_failure_falls_back_to_configured_version() {
    let base = refused_url().await;
    let mut unreachable = endpoint("primary", &base);
    unreachable.api_version = Some("3.1".to_string());

    let client = EndpointClient::new(unreachable, bearer(), &breaker_config(5), None).unwrap();
    assert_eq!(client.detect_version().await.unwrap(), "3.1");
}

#[tokio::test]
async fn test_negotiation_picks_same_major_version() {
    let app = Router::new().route(
        "/api/version",
        get(|| async { Json(json!({"version": "2.1"})) }),
    );
    let base = spawn_server(app).await;

    let client = client(&base);
    let supported = vec!["2.0".to_string(), "3.0".to_string()];
    assert_eq!(client.negotiate_version(&supported).await.unwrap(), "2.0");
}

#[tokio::test]
async fn test_negotiation_keeps_detected_when_no_major_matches() {
    let app = Router::new().route(
        "/api/version",
        get(|| async { Json(json!({"version": "5.0"})) }),
    );
    let base = spawn_server(app).await;

    let client = client(&base);
    let supported = vec!["2.0".to_string(), "3.0".to_string()];
    assert_eq!(client.negotiate_version(&supported).await.unwrap(), "5.0");
}

#[tokio::test]
async fn test_soap_call_posts_envelope() {
    let app = Router::new().route(
        "/",
        post(|headers: HeaderMap, body: String| async move {
            assert_eq!(headers["soapaction"], "\"GetLot\"");
            assert!(body.contains("<GetLot><lotId>L-7</lotId></GetLot>"));
            assert!(body.contains("<wsse:Username>svc</wsse:Username>"));
            "<soap:Envelope>ok</soap:Envelope>".to_string()
        }),
    );
    let base = spawn_server(app).await;

    let mut soap_endpoint = endpoint("soap", &base);
    soap_endpoint.transport = TransportKind::Soap;
    let client = EndpointClient::new(
        soap_endpoint,
        Credentials::Wsse {
            username: "svc".to_string(),
            password: "secret".to_string(),
        },
        &breaker_config(5),
        None,
    )
    .unwrap();

    let value = client.call("GetLot", &json!({"lotId": "L-7"})).await.unwrap();
    assert_eq!(value, Value::String("<soap:Envelope>ok</soap:Envelope>".to_string()));
}

#[tokio::test]
async fn test_retry_recovers_from_transient_503() {
    let hits = Arc::new(AtomicU32::new(0));
    let app = Router::new()
        .route(
            "/api/lots",
            get(|State(hits): State<Arc<AtomicU32>>| async move {
                if hits.fetch_add(1, Ordering::SeqCst) < 2 {
                    (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"message": "warming up"})))
                } else {
                    (StatusCode::OK, Json(json!({"lots": []})))
                }
            }),
        )
        .with_state(Arc::clone(&hits));
    let base = spawn_server(app).await;

    let client = client(&base);
    let policy = RetryPolicy {
        max_retries: 3,
        initial_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        backoff_multiplier: 2.0,
    };

    let value = policy
        .run(|| client.get("/api/lots", None), default_retryable)
        .await
        .unwrap();
    assert_eq!(value["lots"], json!([]));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_breaker_opens_after_connection_failures() {
    let base = refused_url().await;
    let client = EndpointClient::new(
        endpoint("primary", &base),
        bearer(),
        &breaker_config(2),
        None,
    )
    .unwrap();

    for _ in 0..2 {
        assert!(client.get("/api/lots", None).await.is_err());
    }
    assert_eq!(client.circuit_state(), CircuitState::Open);

    // Short-circuited without touching the network.
    let err = client.get("/api/lots", None).await.unwrap_err();
    assert!(matches!(err, Error::CircuitOpen(_)));
}

fn two_endpoint_backend(primary_url: &str, secondary_url: &str) -> BackendConfig {
    BackendConfig {
        endpoints: vec![
            endpoint("primary", primary_url),
            endpoint("secondary", secondary_url),
        ],
        default_endpoint: "primary".to_string(),
        credentials: bearer(),
        version_negotiation: VersionNegotiation::default(),
    }
}

#[tokio::test]
async fn test_connector_resolves_default_and_unknown_names() {
    let base = refused_url().await;
    let connector =
        Connector::new(&two_endpoint_backend(&base, &base), &breaker_config(5)).unwrap();

    assert_eq!(connector.get_client(None).name(), "primary");
    assert_eq!(connector.get_client(Some("secondary")).name(), "secondary");
    assert_eq!(connector.get_client(Some("tertiary")).name(), "primary");
}

#[tokio::test]
async fn test_connector_rejects_missing_default() {
    let base = refused_url().await;
    let mut backend = two_endpoint_backend(&base, &base);
    backend.default_endpoint = "missing".to_string();
    assert!(Connector::new(&backend, &breaker_config(5)).is_err());
}

#[tokio::test]
async fn test_fallback_skips_open_breaker() {
    let dead = refused_url().await;
    let app = Router::new().route("/api/lots", get(|| async { Json(json!({"lots": []})) }));
    let alive = spawn_server(app).await;

    let connector =
        Connector::new(&two_endpoint_backend(&dead, &alive), &breaker_config(1)).unwrap();

    // A healthy requested endpoint is returned unchanged.
    assert_eq!(connector.fallback_to_secondary("primary").name(), "primary");

    // Open the primary's breaker with one real failure.
    let primary = connector.get_client(Some("primary"));
    assert!(primary.get("/api/lots", None).await.is_err());
    assert_eq!(primary.circuit_state(), CircuitState::Open);

    let fallback = connector.fallback_to_secondary("primary");
    assert_eq!(fallback.name(), "secondary");
    assert!(fallback.get("/api/lots", None).await.is_ok());
}

#[tokio::test]
async fn test_fallback_returns_original_when_all_broken() {
    let dead = refused_url().await;
    let connector =
        Connector::new(&two_endpoint_backend(&dead, &dead), &breaker_config(1)).unwrap();

    for name in ["primary", "secondary"] {
        let client = connector.get_client(Some(name));
        assert!(client.get("/api/lots", None).await.is_err());
        assert_eq!(client.circuit_state(), CircuitState::Open);
    }

    // Nothing healthy to fail over to: the caller gets the original client
    // back and its breaker fails the call fast.
    let client = connector.fallback_to_secondary("primary");
    assert_eq!(client.name(), "primary");
    let err = client.get("/api/lots", None).await.unwrap_err();
    assert!(matches!(err, Error::CircuitOpen(_)));
}

#[tokio::test]
async fn test_connector_negotiation_toggle() {
    let app = Router::new().route(
        "/api/version",
        get(|| async { Json(json!({"version": "2.1"})) }),
    );
    let base = spawn_server(app).await;

    let mut backend = two_endpoint_backend(&base, &base);
    backend.version_negotiation.supported_versions = vec!["2.0".to_string()];
    let connector = Connector::new(&backend, &breaker_config(5)).unwrap();
    assert_eq!(connector.negotiate_version(None).await.unwrap(), "2.0");

    // Disabled negotiation reduces to plain detection.
    let mut backend = two_endpoint_backend(&base, &base);
    backend.version_negotiation.enabled = false;
    backend.version_negotiation.supported_versions = vec!["2.0".to_string()];
    let connector = Connector::new(&backend, &breaker_config(5)).unwrap();
    assert_eq!(connector.negotiate_version(None).await.unwrap(), "2.1");
}
