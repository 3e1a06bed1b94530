//! HTTP handlers and their DTOs.

mod configs;
mod executions;
mod system;
mod templates;
mod tools;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod configs_test;
#[cfg(test)]
mod executions_test;

use axum::Json;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

pub use configs::*;
pub use executions::*;
pub use system::*;
pub use templates::*;
pub use tools::*;

use crate::db::{DbError, GLOBAL_USER};
use crate::dispatch::DispatchError;

/// Error response DTO
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Error message
    #[schema(example = "no configuration for tool 'list-projects' and user 'u1'")]
    pub error: String,
    /// Error taxonomy kind, for dispatch failures
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "ConfigNotFound")]
    pub kind: Option<String>,
}

pub(crate) type ApiFailure = (StatusCode, Json<ErrorResponse>);

impl ErrorResponse {
    fn message(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            kind: None,
        }
    }
}

impl From<&DispatchError> for ErrorResponse {
    fn from(err: &DispatchError) -> Self {
        Self {
            error: err.to_string(),
            kind: Some(err.kind().to_string()),
        }
    }
}

/// `?user_id=` query shared by the tenant-scoped endpoints.
#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct UserQuery {
    /// Caller identity; defaults to the shared `global` tenant
    #[param(example = "u1")]
    pub user_id: Option<String>,
}

impl UserQuery {
    pub(crate) fn user_or_global(&self) -> String {
        self.user_id
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| GLOBAL_USER.to_string())
    }
}

/// HTTP status for a dispatch failure.
pub fn dispatch_status(err: &DispatchError) -> StatusCode {
    match err {
        DispatchError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        DispatchError::ConfigNotFound { .. } => StatusCode::NOT_FOUND,
        DispatchError::Authentication { .. } => StatusCode::UNAUTHORIZED,
        DispatchError::Rejected {
            status: Some(status),
        } if (400..500).contains(status) => {
            StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
        }
        DispatchError::Rejected { .. } => StatusCode::BAD_GATEWAY,
        DispatchError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
        DispatchError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        DispatchError::Render(_) | DispatchError::Internal(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub(crate) fn dispatch_failure(err: &DispatchError) -> ApiFailure {
    (dispatch_status(err), Json(ErrorResponse::from(err)))
}

pub(crate) fn db_failure(err: DbError, what: &str) -> ApiFailure {
    match err {
        DbError::NotFound { .. } => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::message(format!("{} not found", what))),
        ),
        DbError::Validation { message } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse::message(message)),
        ),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::message(other.to_string())),
        ),
    }
}

pub(crate) fn unprocessable(message: impl Into<String>) -> ApiFailure {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse::message(message)),
    )
}
