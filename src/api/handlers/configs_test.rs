//! Integration tests for configuration management endpoints.

use axum::http::StatusCode;
use serde_json::json;
use tower::ServiceExt;

use super::test_support::{get, json_body, send, test_app};
use crate::db::{ConfigStore, Database};

#[tokio::test(flavor = "multi_thread")]
async fn wrapped_upsert_masks_secrets_and_canonicalizes_tool() {
    let (app, state) = test_app().await;

    let response = app
        .oneshot(send(
            "POST",
            "/mcp-config",
            json!({
                "user_id": "u1",
                "config": {
                    "tool_desc": "Get_Projects",
                    "endpoint": "https://op.example",
                    "api_key": "secret-api-key-1234",
                    "default_params": {"page_size": 10}
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["user_id"], "u1");
    assert_eq!(body["tool_desc"], "list-projects");
    assert_eq!(body["api_key"], "***1234");
    assert_eq!(body["interaction_mode"], "stdio");
    assert_eq!(body["auth"]["type"], "api_key");

    // The store keeps the real key.
    let stored = state.db().configs().resolve("u1", "list-projects").await.unwrap();
    assert_eq!(stored.api_key, "secret-api-key-1234");
    assert_eq!(stored.default_params["page_size"], 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn outer_user_id_overrides_config_user_id() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(send(
            "POST",
            "/mcp-config",
            json!({
                "user_id": "outer",
                "config": {
                    "user_id": "inner",
                    "tool_desc": "list-projects",
                    "endpoint": "https://op.example",
                    "api_key": "secret-api-key-1234"
                }
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user_id"], "outer");
}

#[tokio::test(flavor = "multi_thread")]
async fn bare_upsert_defaults_to_global_user() {
    let (app, _) = test_app().await;

    let response = app
        .clone()
        .oneshot(send(
            "POST",
            "/mcp-config",
            json!({
                "tool_desc": "get-project",
                "endpoint": "https://op.example",
                "api_key": "secret-api-key-1234"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["user_id"], "global");

    let response = app.oneshot(get("/mcp-config")).await.unwrap();
    let body = json_body(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["tool_desc"], "get-project");
}

#[tokio::test(flavor = "multi_thread")]
async fn oauth_tokens_are_masked() {
    let (app, _) = test_app().await;

    let response = app
        .oneshot(send(
            "POST",
            "/mcp-config",
            json!({
                "tool_desc": "list-projects",
                "endpoint": "https://op.example",
                "api_key": "secret-api-key-1234",
                "auth": {"type": "oauth", "access_token": "access-token-abcd"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["auth"]["type"], "oauth");
    assert_eq!(body["auth"]["access_token"], "***abcd");
}

#[tokio::test(flavor = "multi_thread")]
async fn invalid_configs_are_rejected() {
    let (app, _) = test_app().await;

    // Missing endpoint fails deserialization.
    let response = app
        .clone()
        .oneshot(send(
            "POST",
            "/mcp-config",
            json!({"tool_desc": "list-projects", "api_key": "k"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .starts_with("invalid configuration")
    );

    // Unknown tool fails validation in the store.
    let response = app
        .clone()
        .oneshot(send(
            "POST",
            "/mcp-config",
            json!({
                "tool_desc": "format-disk",
                "endpoint": "https://op.example",
                "api_key": "secret-api-key-1234"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    // http mode needs a url.
    let response = app
        .oneshot(send(
            "POST",
            "/mcp-config",
            json!({
                "tool_desc": "list-projects",
                "interaction_mode": "http",
                "endpoint": "https://op.example",
                "api_key": "secret-api-key-1234"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test(flavor = "multi_thread")]
async fn list_is_scoped_to_user() {
    let (app, _) = test_app().await;

    for (user, tool) in [("u1", "list-projects"), ("u1", "get-project"), ("u2", "log-time")] {
        let response = app
            .clone()
            .oneshot(send(
                "POST",
                "/mcp-config",
                json!({
                    "user_id": user,
                    "config": {
                        "tool_desc": tool,
                        "endpoint": "https://op.example",
                        "api_key": "secret-api-key-1234"
                    }
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.clone().oneshot(get("/mcp-config?user_id=u1")).await.unwrap();
    assert_eq!(json_body(response).await.as_array().unwrap().len(), 2);

    let response = app.oneshot(get("/mcp-config?user_id=u3")).await.unwrap();
    assert_eq!(json_body(response).await, json!([]));
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_removes_config_once() {
    let (app, _) = test_app().await;
    let response = app
        .clone()
        .oneshot(send(
            "POST",
            "/mcp-config",
            json!({
                "user_id": "u1",
                "config": {
                    "tool_desc": "list-projects",
                    "endpoint": "https://op.example",
                    "api_key": "secret-api-key-1234"
                }
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(send("DELETE", "/mcp-config/list-projects?user_id=u1", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"status": "deleted"}));

    let response = app
        .oneshot(send("DELETE", "/mcp-config/list-projects?user_id=u1", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        json_body(response).await["error"],
        "Configuration for 'list-projects' not found"
    );
}
