//! SQLite TemplateRepository implementation.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::utils::current_timestamp;
use crate::db::{DbError, DbResult, Template, TemplateRepository};

/// SQLx-backed template repository.
pub struct SqliteTemplateRepository<'a> {
    pub(crate) pool: &'a SqlitePool,
}

fn row_to_template(row: &SqliteRow) -> Template {
    Template {
        name: row.get("name"),
        content: row.get("content"),
        description: row.get("description"),
        created_by: row.get("created_by"),
        version: row.get("version"),
        created_at: Some(row.get("created_at")),
        updated_at: Some(row.get("updated_at")),
    }
}

impl<'a> TemplateRepository for SqliteTemplateRepository<'a> {
    async fn get(&self, name: &str) -> DbResult<Template> {
        let row = sqlx::query(
            "SELECT name, content, description, created_by, version, created_at, updated_at FROM template WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await
        .map_err(|e| DbError::Database {
            message: e.to_string(),
        })?;

        row.map(|r| row_to_template(&r))
            .ok_or_else(|| DbError::not_found("Template", name))
    }

    async fn upsert(&self, template: &Template) -> DbResult<Template> {
        template.validate()?;
        let now = current_timestamp();

        sqlx::query(
            "INSERT INTO template (name, content, description, created_by, version, created_at, updated_at) \
             VALUES (?, ?, ?, ?, 1, ?, ?) \
             ON CONFLICT(name) DO UPDATE SET \
                content = excluded.content, \
                description = COALESCE(excluded.description, template.description), \
                created_by = COALESCE(template.created_by, excluded.created_by), \
                version = template.version + 1, \
                updated_at = excluded.updated_at",
        )
        .bind(&template.name)
        .bind(&template.content)
        .bind(&template.description)
        .bind(&template.created_by)
        .bind(&now)
        .bind(&now)
        .execute(self.pool)
        .await
        .map_err(|e| DbError::Database {
            message: e.to_string(),
        })?;

        self.get(&template.name).await
    }

    async fn list(&self) -> DbResult<Vec<Template>> {
        let rows = sqlx::query(
            "SELECT name, content, description, created_by, version, created_at, updated_at FROM template ORDER BY name",
        )
        .fetch_all(self.pool)
        .await
        .map_err(|e| DbError::Database {
            message: e.to_string(),
        })?;

        Ok(rows.iter().map(row_to_template).collect())
    }
}
