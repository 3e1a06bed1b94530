use crate::cli::commands::config::*;
use crate::cli::commands::test_support::spawn_test_server;
use crate::cli::error::CliError;

fn request(user: &str, tool: &str) -> SetConfigRequest {
    SetConfigRequest {
        user_id: Some(user.to_string()),
        tool_desc: tool.to_string(),
        endpoint: "https://op.example".to_string(),
        api_key: "secret-api-key-1234".to_string(),
        ..Default::default()
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_and_list_configs() {
    let (api_client, _handle) = spawn_test_server().await;

    let output = set_config(&api_client, request("u1", "list_projects"))
        .await
        .unwrap();
    assert_eq!(output, "✓ Stored configuration: list-projects for u1");

    let output = list_configs(&api_client, Some("u1"), "json").await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 1);
    assert_eq!(parsed[0]["api_key"], "***1234");

    let table = list_configs(&api_client, Some("u1"), "table").await.unwrap();
    assert!(table.contains("list-projects"));
    assert!(table.contains("***1234"));
    assert!(!table.contains("secret-api-key"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_list_empty() {
    let (api_client, _handle) = spawn_test_server().await;

    let output = list_configs(&api_client, Some("nobody"), "table")
        .await
        .unwrap();

    assert_eq!(output, "No configurations found.");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_with_default_params_and_mode() {
    let (api_client, _handle) = spawn_test_server().await;

    let mut req = request("u1", "weekly-report");
    req.interaction_mode = Some("sse".to_string());
    req.url = Some("https://gateway.example/sse".to_string());
    req.default_params = Some(r#"{"project_id": 5}"#.to_string());
    set_config(&api_client, req).await.unwrap();

    let output = list_configs(&api_client, Some("u1"), "json").await.unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(parsed[0]["interaction_mode"], "sse");
    assert_eq!(parsed[0]["default_params"]["project_id"], 5);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_rejected_by_server() {
    let (api_client, _handle) = spawn_test_server().await;

    let mut req = request("u1", "list-projects");
    req.interaction_mode = Some("http".to_string());
    let err = set_config(&api_client, req).await.unwrap_err();

    assert!(matches!(err, CliError::ApiError { status: 422, .. }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_default_params_never_reach_server() {
    let (api_client, _handle) = spawn_test_server().await;

    let mut req = request("u1", "list-projects");
    req.default_params = Some("[1]".to_string());
    let err = set_config(&api_client, req).await.unwrap_err();

    assert!(matches!(err, CliError::InvalidInput { .. }));
    let output = list_configs(&api_client, Some("u1"), "json").await.unwrap();
    assert_eq!(output, "[]");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_delete_config() {
    let (api_client, _handle) = spawn_test_server().await;
    set_config(&api_client, request("u1", "log-time"))
        .await
        .unwrap();

    let output = delete_config(&api_client, "log-time", Some("u1"))
        .await
        .unwrap();
    assert_eq!(output, "✓ Deleted configuration: log-time");

    let err = delete_config(&api_client, "log-time", Some("u1"))
        .await
        .unwrap_err();
    assert!(matches!(err, CliError::ApiError { status: 404, .. }));
}
