//! SQLite ConfigStore implementation.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::utils::current_timestamp;
use crate::db::{ConfigStore, DbError, DbResult, ServiceConfig, canonical_tool_desc};

const SELECT_COLUMNS: &str = "SELECT user_id, tool_desc, interaction_mode, url, endpoint, api_key, \
     default_params, auth, created_at, updated_at FROM service_config";

/// SQLx-backed service config store.
pub struct SqliteConfigStore<'a> {
    pub(crate) pool: &'a SqlitePool,
}

fn row_to_config(row: &SqliteRow) -> DbResult<ServiceConfig> {
    let mode: String = row.get("interaction_mode");
    let params_json: String = row.get("default_params");
    let auth_json: String = row.get("auth");

    let default_params = serde_json::from_str(&params_json).map_err(|e| DbError::Database {
        message: format!("corrupt default_params: {}", e),
    })?;
    let auth = serde_json::from_str(&auth_json).map_err(|e| DbError::Database {
        message: format!("corrupt auth: {}", e),
    })?;

    Ok(ServiceConfig {
        user_id: row.get("user_id"),
        tool_desc: row.get("tool_desc"),
        interaction_mode: mode.parse()?,
        url: row.get("url"),
        endpoint: row.get("endpoint"),
        api_key: row.get("api_key"),
        default_params,
        auth,
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    })
}

impl<'a> ConfigStore for SqliteConfigStore<'a> {
    async fn resolve(&self, user_id: &str, tool_desc: &str) -> DbResult<ServiceConfig> {
        let tool_desc = canonical_tool_desc(tool_desc);
        let row = sqlx::query(&format!(
            "{} WHERE user_id = ? AND tool_desc = ?",
            SELECT_COLUMNS
        ))
        .bind(user_id)
        .bind(&tool_desc)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DbError::Database {
            message: e.to_string(),
        })?;

        let row = row.ok_or_else(|| {
            DbError::not_found("ServiceConfig", format!("{}/{}", user_id, tool_desc))
        })?;
        row_to_config(&row)
    }

    async fn upsert(&self, config: &ServiceConfig) -> DbResult<ServiceConfig> {
        let config = config.clone().validated()?;
        let now = current_timestamp();

        let params_json = serde_json::to_string(&config.default_params).map_err(|e| {
            DbError::Validation {
                message: e.to_string(),
            }
        })?;
        let auth_json = serde_json::to_string(&config.auth).map_err(|e| DbError::Validation {
            message: e.to_string(),
        })?;

        // The conflict branch leaves id and created_at alone so list order is stable.
        sqlx::query(
            "INSERT INTO service_config (user_id, tool_desc, interaction_mode, url, endpoint, api_key, default_params, auth, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(user_id, tool_desc) DO UPDATE SET \
                interaction_mode = excluded.interaction_mode, \
                url = excluded.url, \
                endpoint = excluded.endpoint, \
                api_key = excluded.api_key, \
                default_params = excluded.default_params, \
                auth = excluded.auth, \
                updated_at = excluded.updated_at",
        )
        .bind(&config.user_id)
        .bind(&config.tool_desc)
        .bind(config.interaction_mode.as_str())
        .bind(&config.url)
        .bind(&config.endpoint)
        .bind(&config.api_key)
        .bind(&params_json)
        .bind(&auth_json)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .map_err(|e| DbError::Database {
            message: e.to_string(),
        })?;

        self.resolve(&config.user_id, &config.tool_desc).await
    }

    async fn list(&self, user_id: &str) -> DbResult<Vec<ServiceConfig>> {
        let rows = sqlx::query(&format!("{} WHERE user_id = ? ORDER BY id", SELECT_COLUMNS))
            .bind(user_id)
            .fetch_all(self.pool)
            .await
            .map_err(|e| DbError::Database {
                message: e.to_string(),
            })?;

        rows.iter().map(row_to_config).collect()
    }

    async fn delete(&self, user_id: &str, tool_desc: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM service_config WHERE user_id = ? AND tool_desc = ?")
            .bind(user_id)
            .bind(canonical_tool_desc(tool_desc))
            .execute(self.pool)
            .await
            .map_err(|e| DbError::Database {
                message: e.to_string(),
            })?;

        Ok(result.rows_affected() > 0)
    }
}
