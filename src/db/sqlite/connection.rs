//! SQLite database connection and migration management.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::debug;

use super::{SqliteConfigStore, SqliteExecutionLog, SqliteTemplateRepository};
use crate::db::{Database, DbError, DbResult};

/// SQLite database implementation.
///
/// Provides access to repositories via associated types, avoiding dynamic dispatch.
pub struct SqliteDatabase {
    pool: SqlitePool,
}

impl SqliteDatabase {
    /// Open (or create) a database file.
    pub async fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path.as_ref())
            .create_if_missing(true);
        Self::connect_with(options, 8).await
    }

    /// Connect using a `sqlite:` URL, e.g. `sqlite://data/opgate.db`.
    pub async fn connect(url: &str) -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?
            .create_if_missing(true);
        Self::connect_with(options, 8).await
    }

    /// Create an in-memory database (useful for testing).
    ///
    /// Every pooled connection would otherwise get its own empty database,
    /// so the pool is pinned to a single connection that never expires.
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            DbError::Connection {
                message: e.to_string(),
            }
        })?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    async fn connect_with(options: SqliteConnectOptions, max_connections: u32) -> DbResult<Self> {
        let options = options
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Connection {
                message: e.to_string(),
            })?;
        Ok(Self { pool })
    }

    /// Underlying pool, for tests and ad-hoc queries.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl Database for SqliteDatabase {
    type Configs<'a> = SqliteConfigStore<'a>;
    type Executions<'a> = SqliteExecutionLog<'a>;
    type Templates<'a> = SqliteTemplateRepository<'a>;

    async fn migrate(&self) -> DbResult<()> {
        sqlx::migrate!("./data/sql/sqlite")
            .run(&self.pool)
            .await
            .map_err(|e| DbError::Migration {
                message: e.to_string(),
            })?;
        debug!("sqlite migrations applied");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "sqlite"
    }

    fn configs(&self) -> Self::Configs<'_> {
        SqliteConfigStore { pool: &self.pool }
    }

    fn executions(&self) -> Self::Executions<'_> {
        SqliteExecutionLog { pool: &self.pool }
    }

    fn templates(&self) -> Self::Templates<'_> {
        SqliteTemplateRepository { pool: &self.pool }
    }
}
