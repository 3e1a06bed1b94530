//! Tests for the SQLite template repository.

use crate::db::{Database, DbError, SqliteDatabase, Template, TemplateRepository};

async fn test_db() -> SqliteDatabase {
    let db = SqliteDatabase::in_memory().await.unwrap();
    db.migrate().await.unwrap();
    db
}

#[tokio::test(flavor = "multi_thread")]
async fn get_missing_template_is_not_found() {
    let db = test_db().await;
    assert!(matches!(
        db.templates().get("weekly_report").await,
        Err(DbError::NotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_creates_then_bumps_version() {
    let db = test_db().await;

    let mut template = Template::new("weekly_report", "v1 {{ week }}");
    template.created_by = Some("alice".to_string());
    let first = db.templates().upsert(&template).await.unwrap();
    assert_eq!(first.version, 1);

    let second = db
        .templates()
        .upsert(&Template::new("weekly_report", "v2 {{ week }}"))
        .await
        .unwrap();
    assert_eq!(second.version, 2);
    assert_eq!(second.content, "v2 {{ week }}");
    assert_eq!(second.created_by.as_deref(), Some("alice"));

    assert_eq!(db.templates().list().await.unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn upsert_rejects_empty_name() {
    let db = test_db().await;
    assert!(matches!(
        db.templates().upsert(&Template::new(" ", "x")).await,
        Err(DbError::Validation { .. })
    ));
}
