//! Service configuration management handlers.

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{ApiFailure, UserQuery, db_failure, unprocessable};
use crate::api::AppState;
use crate::db::{ConfigStore, Database, Params, ServiceConfig};
use crate::upstream::Upstream;

// =============================================================================
// DTOs (Data Transfer Objects)
// =============================================================================

/// Service configuration as returned to callers; secrets are masked.
#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigResponse {
    #[schema(example = "u1")]
    pub user_id: String,
    #[schema(example = "list-projects")]
    pub tool_desc: String,
    #[schema(example = "stdio")]
    pub interaction_mode: String,
    pub url: Option<String>,
    #[schema(example = "https://openproject.example.com")]
    pub endpoint: String,
    /// Masked api key
    #[schema(example = "***a1b2")]
    pub api_key: String,
    #[schema(value_type = Object)]
    pub default_params: Params,
    /// Masked auth settings
    pub auth: Value,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<ServiceConfig> for ConfigResponse {
    fn from(config: ServiceConfig) -> Self {
        let config = config.masked();
        Self {
            auth: serde_json::to_value(&config.auth).unwrap_or(Value::Null),
            user_id: config.user_id,
            tool_desc: config.tool_desc,
            interaction_mode: config.interaction_mode.to_string(),
            url: config.url,
            endpoint: config.endpoint,
            api_key: config.api_key,
            default_params: config.default_params,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}

/// Upsert request: either `{"user_id"?, "config": {...}}` or a bare config.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum ConfigRequest {
    Wrapped {
        /// Owner; takes precedence over `config.user_id`
        user_id: Option<String>,
        config: Value,
    },
    Bare(Value),
}

impl ConfigRequest {
    fn into_config(self) -> Result<ServiceConfig, serde_json::Error> {
        match self {
            ConfigRequest::Wrapped { user_id, config } => {
                let mut config: ServiceConfig = serde_json::from_value(config)?;
                if let Some(user_id) = user_id {
                    config.user_id = user_id;
                }
                Ok(config)
            }
            ConfigRequest::Bare(config) => serde_json::from_value(config),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DeletedResponse {
    #[schema(example = "deleted")]
    pub status: String,
}

// =============================================================================
// Handlers
// =============================================================================

/// Create or replace a service configuration
#[utoipa::path(
    post,
    path = "/mcp-config",
    tag = "configs",
    request_body = ConfigRequest,
    responses(
        (status = 200, description = "Stored configuration", body = ConfigResponse),
        (status = 422, description = "Invalid configuration", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn upsert_config<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
    Json(req): Json<ConfigRequest>,
) -> Result<Json<ConfigResponse>, ApiFailure> {
    let config = req
        .into_config()
        .map_err(|e| unprocessable(format!("invalid configuration: {}", e)))?;

    let stored = state
        .db()
        .configs()
        .upsert(&config)
        .await
        .map_err(|e| db_failure(e, "Configuration"))?;

    info!(
        user_id = %stored.user_id,
        tool = %stored.tool_desc,
        "Stored service configuration"
    );
    Ok(Json(ConfigResponse::from(stored)))
}

/// List a user's service configurations
#[utoipa::path(
    get,
    path = "/mcp-config",
    tag = "configs",
    params(UserQuery),
    responses(
        (status = 200, description = "Configurations of the user", body = Vec<ConfigResponse>),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn list_configs<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
    Query(query): Query<UserQuery>,
) -> Result<Json<Vec<ConfigResponse>>, ApiFailure> {
    let configs = state
        .db()
        .configs()
        .list(&query.user_or_global())
        .await
        .map_err(|e| db_failure(e, "Configuration"))?;

    Ok(Json(configs.into_iter().map(ConfigResponse::from).collect()))
}

/// Delete a service configuration
#[utoipa::path(
    delete,
    path = "/mcp-config/{tool_desc}",
    tag = "configs",
    params(
        ("tool_desc" = String, Path, description = "Tool name"),
        UserQuery
    ),
    responses(
        (status = 200, description = "Configuration deleted", body = DeletedResponse),
        (status = 404, description = "Configuration not found", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn delete_config<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
    Path(tool_desc): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<DeletedResponse>, ApiFailure> {
    let user_id = query.user_or_global();
    let removed = state
        .db()
        .configs()
        .delete(&user_id, &tool_desc)
        .await
        .map_err(|e| db_failure(e, "Configuration"))?;

    if !removed {
        return Err(db_failure(
            crate::db::DbError::NotFound {
                entity_type: "ServiceConfig".to_string(),
                id: format!("{}/{}", user_id, tool_desc),
            },
            &format!("Configuration for '{}'", tool_desc),
        ));
    }

    info!(user_id = %user_id, tool = %tool_desc, "Deleted service configuration");
    Ok(Json(DeletedResponse {
        status: "deleted".to_string(),
    }))
}
