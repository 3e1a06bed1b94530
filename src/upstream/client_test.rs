//! Tests for the OpenProject client against a loopback stub server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::db::{AuthConfig, Params, ServiceConfig};
use crate::upstream::{OpenProjectClient, RetryPolicy, Tool, Upstream, UpstreamError};

type Hits = Arc<AtomicUsize>;

async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Stub answering `/api/v3/projects` with a fixed status on every call.
async fn status_stub(status: StatusCode) -> (String, Hits) {
    let hits = Hits::default();
    let router = Router::new()
        .route(
            "/api/v3/projects",
            get(move |State(hits): State<Hits>| async move {
                hits.fetch_add(1, Ordering::SeqCst);
                (status, "{\"message\":\"nope\"}")
            }),
        )
        .with_state(hits.clone());
    (spawn_stub(router).await, hits)
}

fn config(endpoint: &str) -> ServiceConfig {
    ServiceConfig::new("u1", "list-projects", endpoint, "k")
}

fn client(max_retries: u32) -> OpenProjectClient {
    OpenProjectClient::new(RetryPolicy::immediate(max_retries)).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn success_passes_raw_json_through() {
    let router = Router::new().route(
        "/api/v3/projects",
        get(|| async { axum::Json(json!([{"id": 1, "name": "Demo"}])) }),
    );
    let endpoint = spawn_stub(router).await;

    let value = client(0)
        .invoke(&config(&endpoint), Tool::ListProjects, &Params::new())
        .await
        .unwrap();

    assert_eq!(value, json!([{"id": 1, "name": "Demo"}]));
}

#[tokio::test(flavor = "multi_thread")]
async fn transient_failures_retry_exactly_max_retries_times() {
    let (endpoint, hits) = status_stub(StatusCode::SERVICE_UNAVAILABLE).await;

    let err = client(2)
        .invoke(&config(&endpoint), Tool::ListProjects, &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        UpstreamError::Transient {
            attempts: 3,
            status: Some(503),
            ..
        }
    ));
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn unauthorized_is_not_retried() {
    let (endpoint, hits) = status_stub(StatusCode::UNAUTHORIZED).await;

    let err = client(3)
        .invoke(&config(&endpoint), Tool::ListProjects, &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Authentication { status: 401, .. }));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    // The upstream body stays out of the user-facing message.
    assert!(!err.to_string().contains("nope"));
}

#[tokio::test(flavor = "multi_thread")]
async fn other_client_errors_are_rejected_without_retry() {
    let (endpoint, hits) = status_stub(StatusCode::NOT_FOUND).await;

    let err = client(3)
        .invoke(&config(&endpoint), Tool::ListProjects, &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Rejected { status: 404, .. }));
    assert_eq!(err.body(), Some("{\"message\":\"nope\"}"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_is_retried_honoring_retry_after() {
    let hits = Hits::default();
    let router = Router::new()
        .route(
            "/api/v3/projects",
            get(|State(hits): State<Hits>| async move {
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    (StatusCode::TOO_MANY_REQUESTS, [("retry-after", "0")], "slow down")
                        .into_response()
                } else {
                    axum::Json(json!([])).into_response()
                }
            }),
        )
        .with_state(hits.clone());
    let endpoint = spawn_stub(router).await;

    let value = client(1)
        .invoke(&config(&endpoint), Tool::ListProjects, &Params::new())
        .await
        .unwrap();

    assert_eq!(value, json!([]));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn rate_limit_with_past_http_date_is_retried() {
    let hits = Hits::default();
    let router = Router::new()
        .route(
            "/api/v3/projects",
            get(|State(hits): State<Hits>| async move {
                if hits.fetch_add(1, Ordering::SeqCst) == 0 {
                    (
                        StatusCode::TOO_MANY_REQUESTS,
                        [("retry-after", "Thu, 01 Jan 1970 00:00:00 GMT")],
                        "slow down",
                    )
                        .into_response()
                } else {
                    axum::Json(json!([{"id": 1}])).into_response()
                }
            }),
        )
        .with_state(hits.clone());
    let endpoint = spawn_stub(router).await;

    let value = client(1)
        .invoke(&config(&endpoint), Tool::ListProjects, &Params::new())
        .await
        .unwrap();

    assert_eq!(value, json!([{"id": 1}]));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_params_fail_before_any_request() {
    let (endpoint, hits) = status_stub(StatusCode::OK).await;

    let err = client(3)
        .invoke(&config(&endpoint), Tool::GetProject, &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::InvalidParams(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn overall_deadline_becomes_timeout() {
    let router = Router::new().route(
        "/api/v3/projects",
        get(|| async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            axum::Json(json!([]))
        }),
    );
    let endpoint = spawn_stub(router).await;
    let policy = RetryPolicy {
        overall_timeout: Duration::from_millis(100),
        ..RetryPolicy::immediate(3)
    };

    let err = OpenProjectClient::new(policy)
        .unwrap()
        .invoke(&config(&endpoint), Tool::ListProjects, &Params::new())
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Timeout(_)));
}

#[tokio::test(flavor = "multi_thread")]
async fn connection_refused_is_transient() {
    // Bind then drop to get a port nobody listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(1)
        .invoke(
            &config(&format!("http://{}", addr)),
            Tool::ListProjects,
            &Params::new(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, UpstreamError::Transient { attempts: 2, .. }));
}

async fn echo_auth(headers: HeaderMap) -> axum::Json<Value> {
    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let custom = headers
        .get("x-op-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let accept = headers
        .get("accept")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    axum::Json(json!({"authorization": auth, "custom": custom, "accept": accept}))
}

#[tokio::test(flavor = "multi_thread")]
async fn auth_schemes_set_expected_headers() {
    let router = Router::new().route("/api/v3/projects", get(echo_auth));
    let endpoint = spawn_stub(router).await;
    let client = client(0);

    let api_key = client
        .invoke(&config(&endpoint), Tool::ListProjects, &Params::new())
        .await
        .unwrap();
    // base64("apikey:k")
    assert_eq!(api_key["authorization"], "Basic YXBpa2V5Oms=");
    assert_eq!(api_key["accept"], "application/hal+json");

    let mut oauth = config(&endpoint);
    oauth.auth = AuthConfig::OAuth {
        access_token: "tok".to_string(),
        refresh_token: None,
        token_url: None,
    };
    let bearer = client
        .invoke(&oauth, Tool::ListProjects, &Params::new())
        .await
        .unwrap();
    assert_eq!(bearer["authorization"], "Bearer tok");

    let mut jwt = config(&endpoint);
    jwt.auth = AuthConfig::Jwt {
        token: "jwt-token".to_string(),
        header: Some("X-OP-Token".to_string()),
    };
    let custom = client
        .invoke(&jwt, Tool::ListProjects, &Params::new())
        .await
        .unwrap();
    assert_eq!(custom["custom"], "jwt-token");
    assert_eq!(custom["authorization"], "");
}
