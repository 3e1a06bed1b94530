//! Integration tests for the execution log endpoint.

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use super::test_support::{get, json_body, seed_config, send, test_app};

async fn populated_app() -> axum::Router {
    let (app, state) = test_app().await;
    seed_config(&state, "u1", "list-projects").await;

    // Two successes for u1, one missing-config failure for u2.
    for uri in [
        "/mcp/list-projects?user_id=u1",
        "/mcp/list-projects?user_id=u1",
        "/mcp/list-projects?user_id=u2",
    ] {
        app.clone().oneshot(send("POST", uri, json!({}))).await.unwrap();
    }
    app
}

#[tokio::test(flavor = "multi_thread")]
async fn filters_by_user_and_status() {
    let app = populated_app().await;

    let response = app.clone().oneshot(get("/executions?user_id=u1")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 2);
    assert!(body.as_array().unwrap().iter().all(|r| r["status"] == "success"));

    let response = app.oneshot(get("/executions?status=error")).await.unwrap();
    let body = json_body(response).await;
    let records = body.as_array().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["user_id"], "u2");
    assert_eq!(records[0]["error_kind"], "ConfigNotFound");
    assert_eq!(records[0]["tool_desc"], "list-projects");
}

#[tokio::test(flavor = "multi_thread")]
async fn limit_caps_result_count() {
    let app = populated_app().await;

    let response = app.oneshot(get("/executions?limit=1")).await.unwrap();

    assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_filter_accepts_aliases() {
    let app = populated_app().await;

    let response = app.oneshot(get("/executions?tool=get_projects")).await.unwrap();

    assert_eq!(json_body(response).await.as_array().unwrap().len(), 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_status_is_unprocessable() {
    let (app, _) = test_app().await;

    let response = app.oneshot(get("/executions?status=pending")).await.unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}
