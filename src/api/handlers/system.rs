//! System health and status handlers.

use axum::Json;
use axum::extract::State;
use serde::Serialize;
use tracing::instrument;
use utoipa::ToSchema;

use crate::api::AppState;
use crate::db::Database;
use crate::upstream::{Tool, Upstream};

/// Service banner
#[derive(Serialize, ToSchema)]
pub struct ServiceInfo {
    #[schema(example = "opgate")]
    pub name: String,
    #[schema(example = "0.3.0")]
    pub version: String,
    /// Location of the interactive API docs
    #[schema(example = "/docs")]
    pub docs: String,
    /// Number of tools in the catalog
    pub tools: usize,
}

/// Health check response
#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status
    #[schema(example = "ok")]
    pub status: String,
    #[schema(example = "0.3.0")]
    pub version: String,
    /// Active storage backend
    #[schema(example = "sqlite")]
    pub storage: String,
    pub uptime_seconds: u64,
}

/// Service banner
#[utoipa::path(
    get,
    path = "/",
    tag = "system",
    responses(
        (status = 200, description = "Service information", body = ServiceInfo)
    )
)]
#[instrument]
pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        docs: "/docs".to_string(),
        tools: Tool::ALL.len(),
    })
}

/// Health check endpoint
///
/// Returns the current health status of the API
#[utoipa::path(
    get,
    path = "/health",
    tag = "system",
    responses(
        (status = 200, description = "Health check successful", body = HealthResponse)
    )
)]
#[instrument(skip(state))]
pub async fn health<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        storage: state.db().backend().to_string(),
        uptime_seconds: state.uptime_seconds(),
    })
}
