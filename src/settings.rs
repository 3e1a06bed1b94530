//! Environment contract of the server.
//!
//! Every setting has a default; the server binary's flags override what is
//! read here.

use std::env;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{ConfigStore, Database, DbError, DbResult, GLOBAL_USER, ServiceConfig};
use crate::paths::{get_data_dir, get_db_path, get_file_store_dir};
use crate::upstream::{RetryPolicy, Tool};

#[derive(Error, Diagnostic, Debug, PartialEq)]
pub enum SettingsError {
    #[error("Invalid value for {var}: '{value}' ({reason})")]
    #[diagnostic(code(opgate::settings::invalid))]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Where persistent state lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Storage {
    /// sqlx connection URL, e.g. `sqlite://data/opgate.db`.
    SqliteUrl(String),
    SqliteFile(PathBuf),
    /// Directory of JSONL files.
    Files(PathBuf),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub openproject_base_url: Option<String>,
    pub openproject_api_key: Option<String>,
    pub database_url: Option<String>,
    pub file_store: bool,
    pub data_dir: PathBuf,
    pub host: IpAddr,
    pub port: u16,
    pub upstream_timeout: Duration,
    pub upstream_max_retries: u32,
    pub cors_origins: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            openproject_base_url: None,
            openproject_api_key: None,
            database_url: None,
            file_store: false,
            data_dir: get_data_dir(),
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8000,
            upstream_timeout: retry.overall_timeout,
            upstream_max_retries: retry.max_retries,
            cors_origins: Vec::new(),
        }
    }
}

fn parse<T: std::str::FromStr>(var: &'static str, value: String) -> Result<T, SettingsError>
where
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(parsed) => Ok(parsed),
        Err(e) => Err(SettingsError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn parse_bool(var: &'static str, value: String) -> Result<bool, SettingsError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(SettingsError::Invalid {
            var,
            value,
            reason: "expected true or false".to_string(),
        }),
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Read settings through `lookup`; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, SettingsError> {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let mut settings = Settings::default();

        settings.openproject_base_url = get("OPENPROJECT_BASE_URL");
        settings.openproject_api_key = get("OPENPROJECT_API_KEY");
        settings.database_url = get("DATABASE_URL");
        if let Some(value) = get("OPGATE_FILE_STORE") {
            settings.file_store = parse_bool("OPGATE_FILE_STORE", value)?;
        }
        if let Some(dir) = get("OPGATE_DATA_DIR") {
            settings.data_dir = PathBuf::from(dir);
        }
        if let Some(value) = get("OPGATE_HOST") {
            settings.host = parse("OPGATE_HOST", value)?;
        }
        if let Some(value) = get("OPGATE_PORT") {
            settings.port = parse("OPGATE_PORT", value)?;
        }
        if let Some(value) = get("UPSTREAM_TIMEOUT_SECS") {
            settings.upstream_timeout = Duration::from_secs(parse("UPSTREAM_TIMEOUT_SECS", value)?);
        }
        if let Some(value) = get("UPSTREAM_MAX_RETRIES") {
            settings.upstream_max_retries = parse("UPSTREAM_MAX_RETRIES", value)?;
        }
        if let Some(value) = get("CORS_ORIGINS") {
            settings.cors_origins = value
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }

        Ok(settings)
    }

    /// Storage backend selected by these settings.
    ///
    /// The file store wins when enabled; otherwise `DATABASE_URL` is taken
    /// as a `sqlite:` URL or a plain file path.
    pub fn storage(&self) -> Storage {
        if self.file_store {
            return Storage::Files(get_file_store_dir(&self.data_dir));
        }
        match &self.database_url {
            Some(url) if url.starts_with("sqlite:") => Storage::SqliteUrl(url.clone()),
            Some(path) => Storage::SqliteFile(PathBuf::from(path)),
            None => Storage::SqliteFile(get_db_path(&self.data_dir)),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.upstream_max_retries,
            overall_timeout: self.upstream_timeout,
            ..RetryPolicy::default()
        }
    }

    /// Upstream endpoint and key for seeding, when both are configured.
    pub fn upstream_credentials(&self) -> Option<(&str, &str)> {
        match (&self.openproject_base_url, &self.openproject_api_key) {
            (Some(url), Some(key)) => Some((url.as_str(), key.as_str())),
            _ => None,
        }
    }
}

/// Create `global` configs for every catalog tool that has none yet.
///
/// Returns the number of configs created. Existing configs are left alone.
pub async fn seed_global_configs<D: Database>(db: &D, settings: &Settings) -> DbResult<usize> {
    let Some((endpoint, api_key)) = settings.upstream_credentials() else {
        debug!("Upstream credentials not set; skipping global config seeding");
        return Ok(0);
    };

    let mut seeded = 0;
    for tool in Tool::ALL {
        match db.configs().resolve(GLOBAL_USER, tool.name()).await {
            Ok(_) => continue,
            Err(DbError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        db.configs()
            .upsert(&ServiceConfig::new(GLOBAL_USER, tool.name(), endpoint, api_key))
            .await?;
        seeded += 1;
    }

    if seeded > 0 {
        info!(seeded, endpoint = %endpoint, "Seeded global service configurations");
    }
    Ok(seeded)
}
