//! Real loopback server for CLI command tests.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::net::TcpListener;

use crate::api::{AppState, create_router};
use crate::cli::api_client::ApiClient;
use crate::db::{Database, Params, ServiceConfig, SqliteDatabase};
use crate::dispatch::Dispatcher;
use crate::render::TemplateRenderer;
use crate::upstream::{Tool, Upstream, UpstreamError};

/// Answers `list-projects` with one project, the weekly report with one
/// work package and everything else by echoing the params.
pub(crate) struct DemoUpstream;

impl Upstream for DemoUpstream {
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
            _ => Ok(Value::Object(params.clone())),
        }
    }
}

/// Spawn a test HTTP server with an in-memory database
pub(crate) async fn spawn_test_server() -> (ApiClient, tokio::task::JoinHandle<()>) {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let db = SqliteDatabase::in_memory()
        .await
        .expect("Failed to create test database");
    db.migrate().await.expect("Failed to run migrations");
    let dispatcher = Dispatcher::new(
        Arc::new(db),
        DemoUpstream,
        Arc::new(TemplateRenderer::new()),
    );
    let app = create_router(AppState::new(dispatcher));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (ApiClient::new(Some(format!("http://{}", addr))), handle)
}
