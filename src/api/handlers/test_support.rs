//! Shared fixtures for handler tests.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use serde_json::{Value, json};

use crate::api::{AppState, create_router};
use crate::db::{Database, Params, ServiceConfig, SqliteDatabase};
use crate::dispatch::Dispatcher;
use crate::render::TemplateRenderer;
use crate::upstream::{Tool, Upstream, UpstreamError};

/// Upstream with fixed answers per tool.
///
/// `get-project` fails according to its `project_id`: 401, 404, 500 and 504
/// produce the matching upstream failure.
pub(crate) struct CannedUpstream;

impl Upstream for CannedUpstream {
    async fn invoke(
        &self,
        _config: &ServiceConfig,
        tool: Tool,
        params: &Params,
    ) -> Result<Value, UpstreamError> {
        match tool {
            Tool::ListProjects => Ok(json!([{"id": 1, "name": "Demo"}])),
            Tool::WeeklyReport => Ok(json!({
                "_embedded": {"elements": [{
                    "id": 7,
                    "subject": "Release notes",
                    "_links": {"status": {"title": "Closed"}, "project": {"title": "Demo"}}
                }]}
            })),
            Tool::GetProject => match params.get("project_id").and_then(Value::as_i64) {
                Some(401) => Err(UpstreamError::Authentication {
                    status: 401,
                    body: "invalid token".to_string(),
                }),
                Some(404) => Err(UpstreamError::Rejected {
                    status: 404,
                    body: "{\"message\":\"not found\"}".to_string(),
                }),
                Some(500) => Err(UpstreamError::Transient {
                    attempts: 4,
                    reason: "server error".to_string(),
                    status: Some(500),
                }),
                Some(504) => Err(UpstreamError::Timeout(Duration::from_secs(120))),
                _ => Ok(json!({"id": params.get("project_id"), "name": "Demo"})),
            },
            _ => Ok(Value::Object(params.clone())),
        }
    }
}

pub(crate) type TestState = AppState<SqliteDatabase, CannedUpstream>;

/// Create a test app with an in-memory database
pub(crate) async fn test_app() -> (Router, TestState) {
    let db = SqliteDatabase::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    let dispatcher = Dispatcher::new(
        Arc::new(db),
        CannedUpstream,
        Arc::new(TemplateRenderer::new()),
    );
    let state = AppState::new(dispatcher);
    (create_router(state.clone()), state)
}

/// Helper to parse JSON response body
pub(crate) async fn json_body(response: axum::response::Response) -> Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

pub(crate) async fn text_body(response: axum::response::Response) -> String {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(body.to_vec()).unwrap()
}

pub(crate) fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub(crate) fn send(method: &str, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

/// Store a plain api-key config through the store directly.
pub(crate) async fn seed_config(state: &TestState, user_id: &str, tool_desc: &str) {
    use crate::db::ConfigStore;

    state
        .db()
        .configs()
        .upsert(&ServiceConfig::new(
            user_id,
            tool_desc,
            "https://op.example",
            "secret-api-key-1234",
        ))
        .await
        .unwrap();
}
