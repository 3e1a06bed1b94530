//! HTTP and SSE transport.

mod handlers;
mod routes;
mod state;

use std::future::Future;
use std::net::{IpAddr, Ipv4Addr};

use axum::http::HeaderValue;
use miette::Diagnostic;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use handlers::{ErrorResponse, dispatch_status};
pub use routes::{ApiDoc, create_router};
pub use state::AppState;

use crate::db::Database;
use crate::upstream::Upstream;

/// API server configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Host address to bind to
    pub host: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Allowed CORS origins; empty or `*` allows any
    pub cors_origins: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Error, Diagnostic, Debug)]
pub enum ApiError {
    #[error("Failed to bind {addr}: {source}")]
    #[diagnostic(
        code(opgate::api::bind),
        help("Is another process listening on this port? Use --port to pick another.")
    )]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    #[diagnostic(code(opgate::api::serve))]
    Serve(#[from] std::io::Error),
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() || origins.iter().any(|o| o == "*") {
        return layer.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    layer.allow_origin(allowed)
}

/// Serve the API until `shutdown` resolves.
pub async fn run<D, U, F>(config: Config, state: AppState<D, U>, shutdown: F) -> Result<(), ApiError>
where
    D: Database,
    U: Upstream,
    F: Future<Output = ()> + Send + 'static,
{
    info!(cors_origins = ?config.cors_origins, "Configuring CORS");
    let app = create_router(state)
        .layer(cors_layer(&config.cors_origins))
        .layer(TraceLayer::new_for_http());

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| ApiError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("API server stopped");
    Ok(())
}
