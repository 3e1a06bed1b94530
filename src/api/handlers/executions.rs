//! Execution log handlers.

use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use utoipa::{IntoParams, ToSchema};

use super::{ApiFailure, db_failure, unprocessable};
use crate::api::AppState;
use crate::db::{Database, ExecutionLog, ExecutionQuery, ExecutionRecord, ExecutionStatus};
use crate::upstream::Upstream;

const DEFAULT_LIMIT: usize = 50;

/// Execution record response DTO
#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionResponse {
    pub id: Option<i64>,
    #[schema(example = "u1")]
    pub user_id: String,
    #[schema(example = "list-projects")]
    pub tool_desc: String,
    pub params: Value,
    #[schema(example = "success")]
    pub status: String,
    pub result: Option<Value>,
    #[schema(example = "ConfigNotFound")]
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub created_at: Option<String>,
}

impl From<ExecutionRecord> for ExecutionResponse {
    fn from(r: ExecutionRecord) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            tool_desc: r.tool_desc,
            params: r.params,
            status: r.status.as_str().to_string(),
            result: r.result,
            error_kind: r.error_kind,
            error_message: r.error_message,
            duration_ms: r.duration_ms,
            created_at: r.created_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ListExecutionsQuery {
    /// Only records of this user
    #[param(example = "u1")]
    pub user_id: Option<String>,
    /// Only records of this tool
    #[param(example = "list-projects")]
    pub tool: Option<String>,
    /// `success` or `error`
    #[param(example = "error")]
    pub status: Option<String>,
    /// Maximum number of records (default 50)
    #[param(example = 20)]
    pub limit: Option<usize>,
}

/// List execution records, newest first
#[utoipa::path(
    get,
    path = "/executions",
    tag = "executions",
    params(ListExecutionsQuery),
    responses(
        (status = 200, description = "Execution records", body = Vec<ExecutionResponse>),
        (status = 422, description = "Invalid filter", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn list_executions<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
    Query(query): Query<ListExecutionsQuery>,
) -> Result<Json<Vec<ExecutionResponse>>, ApiFailure> {
    let status = query
        .status
        .as_deref()
        .map(str::parse::<ExecutionStatus>)
        .transpose()
        .map_err(|e| unprocessable(e.to_string()))?;

    let db_query = ExecutionQuery {
        user_id: query.user_id,
        tool_desc: query.tool,
        status,
        limit: Some(query.limit.unwrap_or(DEFAULT_LIMIT)),
    };

    let records = state
        .db()
        .executions()
        .list(&db_query)
        .await
        .map_err(|e| db_failure(e, "Execution"))?;

    Ok(Json(
        records.into_iter().map(ExecutionResponse::from).collect(),
    ))
}
