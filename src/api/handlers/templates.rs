//! Report template handlers.

use axum::Json;
use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use super::{ApiFailure, db_failure, unprocessable};
use crate::api::AppState;
use crate::db::{Database, DbError, Template, TemplateRepository};
use crate::render::{DEFAULT_WEEKLY_TEMPLATE, TemplateRenderer};
use crate::upstream::{Upstream, WEEKLY_REPORT_TEMPLATE};

// =============================================================================
// DTOs (Data Transfer Objects)
// =============================================================================

/// Template response DTO
#[derive(Debug, Serialize, ToSchema)]
pub struct TemplateResponse {
    #[schema(example = "weekly_report")]
    pub name: String,
    pub content: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    /// Starts at 1 and grows on every update; 0 for the built-in default
    #[schema(example = 1)]
    pub version: i64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<Template> for TemplateResponse {
    fn from(t: Template) -> Self {
        Self {
            name: t.name,
            content: t.content,
            description: t.description,
            created_by: t.created_by,
            version: t.version,
            created_at: t.created_at,
            updated_at: t.updated_at,
        }
    }
}

/// Create or update template request DTO
#[derive(Debug, Deserialize, ToSchema)]
pub struct TemplateRequest {
    #[schema(example = "# {{ project.name }} / {{ week }}")]
    pub content: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
}

fn built_in(name: &str) -> Option<Template> {
    (name == WEEKLY_REPORT_TEMPLATE).then(|| Template {
        description: Some("Built-in weekly report".to_string()),
        ..Template::new(name, DEFAULT_WEEKLY_TEMPLATE)
    })
}

// =============================================================================
// Handlers
// =============================================================================

/// List stored templates
#[utoipa::path(
    get,
    path = "/templates",
    tag = "templates",
    responses(
        (status = 200, description = "Stored templates", body = Vec<TemplateResponse>),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn list_templates<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
) -> Result<Json<Vec<TemplateResponse>>, ApiFailure> {
    let templates = state
        .db()
        .templates()
        .list()
        .await
        .map_err(|e| db_failure(e, "Template"))?;

    Ok(Json(
        templates.into_iter().map(TemplateResponse::from).collect(),
    ))
}

/// Get a template by name
///
/// Falls back to the built-in default for `weekly_report`.
#[utoipa::path(
    get,
    path = "/templates/{name}",
    tag = "templates",
    params(
        ("name" = String, Path, description = "Template name")
    ),
    responses(
        (status = 200, description = "Template found", body = TemplateResponse),
        (status = 404, description = "Template not found", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    )
)]
#[instrument(skip(state))]
pub async fn get_template<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
    Path(name): Path<String>,
) -> Result<Json<TemplateResponse>, ApiFailure> {
    let template = match state.db().templates().get(&name).await {
        Ok(template) => template,
        Err(e @ DbError::NotFound { .. }) => match built_in(&name) {
            Some(template) => template,
            None => return Err(db_failure(e, &format!("Template '{}'", name))),
        },
        Err(e) => return Err(db_failure(e, &format!("Template '{}'", name))),
    };

    Ok(Json(TemplateResponse::from(template)))
}

/// Create or update a template
///
/// The content is syntax-checked before it is stored; the compiled cache
/// entry for the name is dropped on success.
#[utoipa::path(
    post,
    path = "/templates/{name}",
    tag = "templates",
    params(
        ("name" = String, Path, description = "Template name")
    ),
    request_body = TemplateRequest,
    responses(
        (status = 200, description = "Template stored", body = TemplateResponse),
        (status = 422, description = "Template syntax error", body = super::ErrorResponse),
        (status = 500, description = "Internal server error", body = super::ErrorResponse)
    )
)]
#[instrument(skip(state, req))]
pub async fn put_template<D: Database, U: Upstream>(
    State(state): State<AppState<D, U>>,
    Path(name): Path<String>,
    Json(req): Json<TemplateRequest>,
) -> Result<Json<TemplateResponse>, ApiFailure> {
    TemplateRenderer::check(&req.content).map_err(|e| unprocessable(e.to_string()))?;

    let template = Template {
        description: req.description,
        created_by: req.created_by,
        ..Template::new(&name, req.content)
    };
    let stored = state
        .db()
        .templates()
        .upsert(&template)
        .await
        .map_err(|e| db_failure(e, "Template"))?;
    state.renderer().invalidate(&stored.name);

    info!(template = %stored.name, version = stored.version, "Stored template");
    Ok(Json(TemplateResponse::from(stored)))
}
