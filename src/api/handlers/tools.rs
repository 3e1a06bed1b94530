//! Tool catalog and dispatch handlers (request/response and SSE).

use std::convert::Infallible;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;
use utoipa::ToSchema;

use super::{ApiFailure, UserQuery, dispatch_failure};
use crate::api::AppState;
use crate::db::{Database, Params};
use crate::dispatch::{DispatchError, DispatchOutcome, DispatchRequest};
use crate::upstream::{Tool, ToolInfo, Upstream};

// =============================================================================
// DTOs (Data Transfer Objects)
// =============================================================================

/// Tool call request DTO
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct CallRequest {
    /// Tool parameters; merged over the stored defaults
    #[serde(default)]
    #[schema(value_type = Object)]
    pub params: Params,
    /// Caller identity when not given in the query string
    pub user_id: Option<String>,
}

/// Tool call response DTO
#[derive(Debug, Serialize, ToSchema)]
pub struct CallResponse {
    /// Rendered report for report tools, raw upstream result otherwise
    pub result: Value,
    /// Raw upstream result, report tools only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<Value>,
    #[schema(example = "list-projects")]
    pub tool: String,
    /// Parameters after merging stored defaults
    #[schema(value_type = Object)]
    pub params: Params,
}

impl From<DispatchOutcome> for CallResponse {
    fn from(outcome: DispatchOutcome) -> Self {
        match outcome.report {
            Some(report) => Self {
                result: Value::String(report),
                raw_data: Some(outcome.result),
                tool: outcome.tool,
                params: outcome.params,
            },
            None => Self {
                result: outcome.result,
                raw_data: None,
                tool: outcome.tool,
                params: outcome.params,
            },
        }
    }
}

/// Build the dispatch request from path, query and raw body.
///
/// An empty body counts as `{}`; anything else must be a `CallRequest`
/// object, whatever the content type.
fn normalize(
    tool_desc: String,
    query: &UserQuery,
    body: &Bytes,
) -> Result<DispatchRequest, DispatchError> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        CallRequest::default()
    } else {
        serde_json::from_slice::<CallRequest>(body)
            .map_err(|e| DispatchError::Validation(format!("invalid request body: {}", e)))?
    };
    let query = UserQuery {
        user_id: query.user_id.clone().or(req.user_id),
    };
    Ok(DispatchRequest::new(
        query.user_or_global(),
        tool_desc,
        req.params,
    ))
}

// =============================================================================
// Handlers
// =============================================================================

/// List the tool catalog
#[utoipa::path(
    get,
    path = "/mcp/tools",
    tag = "tools",
    responses(
        (status = 200, description = "Available tools", body = Vec<ToolInfo>)
    )
)]
#[instrument]
pub async fn list_tools() -> Json<Vec<ToolInfo>> {
    Json(Tool::ALL.iter().map(Tool::info).collect())
}

/// Invoke a tool
///
/// Resolves the caller's configuration, calls the upstream once and returns
/// the (possibly rendered) result.
#[utoipa::path(
    post,
    path = "/mcp/{tool_desc}",
    tag = "tools",
    params(
        ("tool_desc" = String, Path, description = "Tool name, e.g. list-projects"),
        UserQuery
    ),
    request_body = CallRequest,
    responses(
        (status = 200, description = "Tool result", body = CallResponse),
        (status = 401, description = "Upstream rejected credentials", body = super::ErrorResponse),
        (status = 404, description = "No configuration for this user and tool", body = super::ErrorResponse),
        (status = 422, description = "Invalid tool or parameters", body = super::ErrorResponse),
        (status = 502, description = "Upstream rejected the request", body = super::ErrorResponse),
        (status = 503, description = "Upstream unavailable", body = super::ErrorResponse),
        (status = 504, description = "Upstream timed out", body = super::ErrorResponse)
    )
)]
#[instrument(skip(state, body))]
pub async fn call_tool<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
    Path(tool_desc): Path<String>,
    Query(query): Query<UserQuery>,
    body: Bytes,
) -> Result<Json<CallResponse>, ApiFailure> {
    let request = normalize(tool_desc, &query, &body).map_err(|e| dispatch_failure(&e))?;

    let outcome = state
        .dispatcher()
        .dispatch(request)
        .await
        .map_err(|e| dispatch_failure(&e))?;

    Ok(Json(CallResponse::from(outcome)))
}

/// Invoke a tool over server-sent events
///
/// Emits exactly one terminal `result` or `error` event carrying the same
/// payload as the request/response endpoint.
#[utoipa::path(
    post,
    path = "/sse/{tool_desc}",
    tag = "tools",
    params(
        ("tool_desc" = String, Path, description = "Tool name, e.g. list-projects"),
        UserQuery
    ),
    request_body = CallRequest,
    responses(
        (status = 200, description = "Event stream with one terminal event", content_type = "text/event-stream")
    )
)]
#[instrument(skip(state, body))]
pub async fn stream_tool<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
    Path(tool_desc): Path<String>,
    Query(query): Query<UserQuery>,
    body: Bytes,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let request = normalize(tool_desc, &query, &body);
    let dispatcher = state.dispatcher().clone();

    let stream = futures_util::stream::once(async move {
        let outcome = match request {
            Ok(request) => dispatcher.dispatch(request).await,
            Err(err) => Err(err),
        };
        let event = match outcome {
            Ok(outcome) => Event::default()
                .event("result")
                .data(outcome.payload().to_string()),
            Err(err) => Event::default()
                .event("error")
                .data(err.payload().to_string()),
        };
        Ok(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
