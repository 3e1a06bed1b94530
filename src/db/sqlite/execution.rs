//! SQLite ExecutionLog implementation.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::db::utils::timestamp_or_now;
use crate::db::{
    DbError, DbResult, ExecutionLog, ExecutionQuery, ExecutionRecord, canonical_tool_desc,
};

/// SQLx-backed execution log.
pub struct SqliteExecutionLog<'a> {
    pub(crate) pool: &'a SqlitePool,
}

fn row_to_record(row: &SqliteRow) -> DbResult<ExecutionRecord> {
    let params: String = row.get("params");
    let result: Option<String> = row.get("result");
    let status: String = row.get("status");
    let duration_ms: i64 = row.get("duration_ms");

    Ok(ExecutionRecord {
        id: Some(row.get("id")),
        user_id: row.get("user_id"),
        tool_desc: row.get("tool_desc"),
        params: serde_json::from_str(&params).unwrap_or_default(),
        status: status.parse()?,
        result: result.and_then(|r| serde_json::from_str(&r).ok()),
        error_kind: row.get("error_kind"),
        error_message: row.get("error_message"),
        duration_ms: duration_ms.max(0) as u64,
        created_at: Some(row.get("created_at")),
    })
}

impl<'a> ExecutionLog for SqliteExecutionLog<'a> {
    async fn append(&self, record: &ExecutionRecord) -> DbResult<ExecutionRecord> {
        let created_at = timestamp_or_now(record.created_at.as_ref());
        let params = record.params.to_string();
        let result = record.result.as_ref().map(|r| r.to_string());

        let done = sqlx::query(
            "INSERT INTO execution_log (user_id, tool_desc, params, status, result, error_kind, error_message, duration_ms, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.user_id)
        .bind(&record.tool_desc)
        .bind(&params)
        .bind(record.status.as_str())
        .bind(&result)
        .bind(&record.error_kind)
        .bind(&record.error_message)
        .bind(record.duration_ms as i64)
        .bind(&created_at)
        .execute(self.pool)
        .await
        .map_err(|e| DbError::Database {
            message: e.to_string(),
        })?;

        Ok(ExecutionRecord {
            id: Some(done.last_insert_rowid()),
            created_at: Some(created_at),
            ..record.clone()
        })
    }

    async fn list(&self, query: &ExecutionQuery) -> DbResult<Vec<ExecutionRecord>> {
        let mut conditions: Vec<&str> = vec![];
        let mut bind_values: Vec<String> = vec![];

        if let Some(user_id) = &query.user_id {
            conditions.push("user_id = ?");
            bind_values.push(user_id.clone());
        }
        if let Some(tool_desc) = &query.tool_desc {
            conditions.push("tool_desc = ?");
            bind_values.push(canonical_tool_desc(tool_desc));
        }
        if let Some(status) = query.status {
            conditions.push("status = ?");
            bind_values.push(status.as_str().to_string());
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let limit_clause = query
            .limit
            .map(|l| format!(" LIMIT {}", l))
            .unwrap_or_default();

        let sql = format!(
            "SELECT id, user_id, tool_desc, params, status, result, error_kind, error_message, duration_ms, created_at \
             FROM execution_log {} ORDER BY id DESC{}",
            where_clause, limit_clause
        );

        let mut q = sqlx::query(&sql);
        for value in &bind_values {
            q = q.bind(value);
        }

        let rows = q.fetch_all(self.pool).await.map_err(|e| DbError::Database {
            message: e.to_string(),
        })?;

        rows.iter().map(row_to_record).collect()
    }
}
