//! opgate server binary.
//!
//! This binary picks the concrete storage backend and upstream client and
//! hands them to the transports, which stay agnostic of both.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use miette::Diagnostic;
use opgate::api::{self, ApiError, AppState, Config};
use opgate::db::{Database, DbError, FileDatabase, SqliteDatabase};
use opgate::dispatch::Dispatcher;
use opgate::logging::init_tracing;
use opgate::render::TemplateRenderer;
use opgate::settings::{Settings, SettingsError, Storage, seed_global_configs};
use opgate::stdio::{self, StdioError};
use opgate::upstream::{OpenProjectClient, UpstreamError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Error, Diagnostic, Debug)]
enum BinaryError {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(opgate::binary::settings))]
    Settings(#[from] SettingsError),

    #[error("Database error: {0}")]
    #[diagnostic(code(opgate::binary::database))]
    Database(#[from] DbError),

    #[error("Failed to create data directory: {0}")]
    #[diagnostic(code(opgate::binary::io))]
    Io(#[from] std::io::Error),

    #[error("Failed to build upstream client: {0}")]
    #[diagnostic(code(opgate::binary::upstream))]
    Upstream(#[from] UpstreamError),

    #[error("API server error: {0}")]
    #[diagnostic(code(opgate::binary::api))]
    Api(#[from] ApiError),

    #[error("stdio transport error: {0}")]
    #[diagnostic(code(opgate::binary::stdio))]
    Stdio(#[from] StdioError),
}

#[derive(Parser)]
#[command(name = "opgate-server")]
#[command(author, version, about = "OpenProject tool gateway server", long_about = None)]
struct Cli {
    /// Host address to bind to (env: OPGATE_HOST)
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on (env: OPGATE_PORT, default 8000)
    #[arg(short, long)]
    port: Option<u16>,

    /// SQLite file or sqlite: URL (env: DATABASE_URL)
    #[arg(long)]
    db: Option<String>,

    /// Use the JSONL file store instead of SQLite (env: OPGATE_FILE_STORE)
    #[arg(long)]
    file_store: bool,

    /// Data directory (env: OPGATE_DATA_DIR, default: XDG data dir)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Serve line-delimited JSON on stdin/stdout instead of HTTP
    #[arg(long)]
    stdio: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) {
        if let Some(host) = self.host {
            settings.host = host;
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(db) = &self.db {
            settings.database_url = Some(db.clone());
        }
        if self.file_store {
            settings.file_store = true;
        }
        if let Some(dir) = &self.data_dir {
            settings.data_dir = dir.clone();
        }
    }
}

async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
    token.cancel();
}

async fn serve<D: Database>(db: D, settings: Settings, use_stdio: bool) -> Result<(), BinaryError> {
    db.migrate().await?;
    info!(storage = db.backend(), "Storage ready");

    seed_global_configs(&db, &settings).await?;

    let upstream = OpenProjectClient::new(settings.retry_policy())?;
    let dispatcher = Dispatcher::new(Arc::new(db), upstream, Arc::new(TemplateRenderer::new()));

    let token = CancellationToken::new();
    tokio::spawn(shutdown_signal(token.clone()));

    if use_stdio {
        tokio::select! {
            result = stdio::run(dispatcher) => result?,
            _ = token.cancelled() => {}
        }
        return Ok(());
    }

    api::run(
        Config {
            host: settings.host,
            port: settings.port,
            cors_origins: settings.cors_origins.clone(),
        },
        AppState::new(dispatcher),
        token.cancelled_owned(),
    )
    .await?;

    Ok(())
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    let _ = rustls::crypto::ring::default_provider().install_default();
    init_tracing();

    let cli = Cli::parse();
    let mut settings = Settings::from_env().map_err(BinaryError::from)?;
    cli.apply(&mut settings);

    match settings.storage() {
        Storage::Files(dir) => {
            info!(dir = %dir.display(), "Opening file store");
            serve(FileDatabase::open(dir), settings, cli.stdio).await?;
        }
        Storage::SqliteUrl(url) => {
            info!(url = %url, "Opening database");
            let db = SqliteDatabase::connect(&url)
                .await
                .map_err(BinaryError::from)?;
            serve(db, settings, cli.stdio).await?;
        }
        Storage::SqliteFile(path) => {
            info!(path = %path.display(), "Opening database");
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(BinaryError::from)?;
            }
            let db = SqliteDatabase::open(&path)
                .await
                .map_err(BinaryError::from)?;
            serve(db, settings, cli.stdio).await?;
        }
    }

    Ok(())
}
