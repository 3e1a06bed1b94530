//! API route configuration.

use axum::Router;
use axum::routing::{delete, get, post};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

use super::handlers::{
    self, CallRequest, CallResponse, ConfigRequest, ConfigResponse, DeletedResponse,
    ErrorResponse, ExecutionResponse, HealthResponse, ServiceInfo, TemplateRequest,
    TemplateResponse,
};
use super::state::AppState;
use crate::db::Database;
use crate::upstream::{ToolInfo, Upstream};

/// Build routes for handlers generic over the storage backend and upstream.
///
/// Applies the turbofish to every handler so route tables stay readable.
macro_rules! routes {
    ($D:ty, $U:ty => {
        $($method:ident $path:literal => $($handler:ident)::+),* $(,)?
    }) => {{
        let router = Router::new();
        $(
            let router = router.route($path, $method($($handler)::+::<$D, $U>));
        )*
        router
    }};
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "opgate API",
        description = "Dispatch of OpenProject tools with per-user configuration",
        license(name = "GPL-2.0")
    ),
    paths(
        handlers::root,
        handlers::health,
        handlers::list_tools,
        handlers::call_tool,
        handlers::stream_tool,
        handlers::upsert_config,
        handlers::list_configs,
        handlers::delete_config,
        handlers::list_templates,
        handlers::get_template,
        handlers::put_template,
        handlers::list_executions,
    ),
    components(
        schemas(
            ServiceInfo,
            HealthResponse,
            ToolInfo,
            CallRequest,
            CallResponse,
            ConfigRequest,
            ConfigResponse,
            DeletedResponse,
            TemplateRequest,
            TemplateResponse,
            ExecutionResponse,
            ErrorResponse,
        )
    ),
    tags(
        (name = "system", description = "System health and status endpoints"),
        (name = "tools", description = "Tool catalog and dispatch"),
        (name = "configs", description = "Per-user service configuration"),
        (name = "templates", description = "Report templates"),
        (name = "executions", description = "Execution log")
    )
)]
pub struct ApiDoc;

/// Create the API router with OpenAPI documentation
pub fn create_router<D: Database, U: Upstream>(state: AppState<D, U>) -> Router {
    let api = ApiDoc::openapi();

    // System routes (non-generic)
    let system_routes = Router::new()
        .route("/", get(handlers::root))
        .route("/mcp/tools", get(handlers::list_tools));

    let generic_routes = routes!(D, U => {
        get "/health" => handlers::health,
        post "/mcp/{tool_desc}" => handlers::call_tool,
        post "/sse/{tool_desc}" => handlers::stream_tool,
        post "/mcp-config" => handlers::upsert_config,
        get "/mcp-config" => handlers::list_configs,
        delete "/mcp-config/{tool_desc}" => handlers::delete_config,
        get "/templates" => handlers::list_templates,
        get "/templates/{name}" => handlers::get_template,
        post "/templates/{name}" => handlers::put_template,
        get "/executions" => handlers::list_executions,
    });

    system_routes
        .merge(generic_routes)
        .merge(Scalar::with_url("/docs", api))
        .with_state(state)
}
