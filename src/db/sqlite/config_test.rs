//! Tests for the SQLite config store.

use serde_json::json;

use crate::db::{
    AuthConfig, ConfigStore, Database, DbError, InteractionMode, ServiceConfig, SqliteDatabase,
};

async fn test_db() -> SqliteDatabase {
    let db = SqliteDatabase::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    db
}

fn config(user_id: &str, tool_desc: &str) -> ServiceConfig {
    ServiceConfig::new(user_id, tool_desc, "https://op.example", "k")
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_then_resolve_returns_stored_config() {
    let db = test_db().await;
    let mut cfg = config("u1", "list-projects");
    cfg.default_params
        .insert("page_size".to_string(), json!(50));

    let stored = db.configs().upsert(&cfg).await.unwrap();
    assert!(stored.created_at.is_some());

    let resolved = db.configs().resolve("u1", "list-projects").await.unwrap();
    assert_eq!(resolved.endpoint, "https://op.example");
    assert_eq!(resolved.default_params["page_size"], json!(50));
    assert_eq!(resolved.auth, AuthConfig::ApiKey);
}

#[tokio::test(flavor = "multi_thread")]
async fn resolve_missing_config_is_not_found() {
    let db = test_db().await;

    let result = db.configs().resolve("u1", "list-projects").await;
    assert!(matches!(result, Err(DbError::NotFound { .. })));
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_existing_key_replaces_without_duplicates() {
    let db = test_db().await;
    db.configs().upsert(&config("u1", "list-projects")).await.unwrap();
    db.configs().upsert(&config("u1", "get-project")).await.unwrap();

    let mut replacement = config("u1", "list-projects");
    replacement.api_key = "rotated".to_string();
    db.configs().upsert(&replacement).await.unwrap();

    let listed = db.configs().list("u1").await.unwrap();
    assert_eq!(listed.len(), 2);
    // Replacement keeps the original primary key, so it still sorts first.
    assert_eq!(listed[0].tool_desc, "list-projects");
    assert_eq!(listed[0].api_key, "rotated");
    assert_eq!(listed[1].tool_desc, "get-project");
}

#[tokio::test(flavor = "multi_thread")]
async fn tool_desc_is_canonicalized() {
    let db = test_db().await;
    db.configs().upsert(&config("u1", "List_Projects")).await.unwrap();

    let resolved = db.configs().resolve("u1", "list-projects").await.unwrap();
    assert_eq!(resolved.tool_desc, "list-projects");
    assert!(db.configs().delete("u1", "LIST_PROJECTS").await.unwrap());
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_rejects_invalid_configs() {
    let db = test_db().await;

    let mut empty_key = config("u1", "list-projects");
    empty_key.api_key = String::new();
    assert!(matches!(
        db.configs().upsert(&empty_key).await,
        Err(DbError::Validation { .. })
    ));

    let mut http_without_url = config("u1", "list-projects");
    http_without_url.interaction_mode = InteractionMode::Http;
    assert!(matches!(
        db.configs().upsert(&http_without_url).await,
        Err(DbError::Validation { .. })
    ));

    assert!(matches!(
        db.configs().upsert(&config("u1", "drop-tables")).await,
        Err(DbError::Validation { .. })
    ));

    assert!(db.configs().list("u1").await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn list_is_scoped_to_user() {
    let db = test_db().await;
    db.configs().upsert(&config("u1", "list-projects")).await.unwrap();
    db.configs().upsert(&config("u2", "list-projects")).await.unwrap();

    let u1 = db.configs().list("u1").await.unwrap();
    assert_eq!(u1.len(), 1);
    assert_eq!(u1[0].user_id, "u1");
}

#[tokio::test(flavor = "multi_thread")]
async fn delete_reports_whether_a_row_was_removed() {
    let db = test_db().await;
    db.configs().upsert(&config("u1", "list-projects")).await.unwrap();

    assert!(db.configs().delete("u1", "list-projects").await.unwrap());
    assert!(!db.configs().delete("u1", "list-projects").await.unwrap());
    assert!(db.configs().resolve("u1", "list-projects").await.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn oauth_auth_round_trips_through_json_column() {
    let db = test_db().await;
    let mut cfg = config("u1", "get-project");
    cfg.auth = AuthConfig::OAuth {
        access_token: "tok-123456789".to_string(),
        refresh_token: None,
        token_url: None,
    };
    db.configs().upsert(&cfg).await.unwrap();

    let resolved = db.configs().resolve("u1", "get-project").await.unwrap();
    assert_eq!(resolved.auth, cfg.auth);
}
