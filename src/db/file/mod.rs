//! JSONL file backend.
//!
//! Each logical table is a `.jsonl` file inside one data directory:
//! `services.jsonl` (ordered configs), `templates.jsonl` and the
//! append-only `executions.jsonl`. Files may be edited externally while
//! the process runs; changes are picked up on the next read.

mod jsonl;
mod table;


use std::path::{Path, PathBuf};

use tracing::debug;

pub use jsonl::{JsonlError, append_jsonl, read_jsonl, write_jsonl};
use table::JsonlTable;

use crate::db::utils::{current_timestamp, timestamp_or_now};
use crate::db::{
    ConfigStore, Database, DbError, DbResult, ExecutionLog, ExecutionQuery, ExecutionRecord,
    ServiceConfig, Template, TemplateRepository, canonical_tool_desc,
};

pub const SERVICES_FILE: &str = "services.jsonl";
pub const TEMPLATES_FILE: &str = "templates.jsonl";
pub const EXECUTIONS_FILE: &str = "executions.jsonl";

/// File-backed database rooted at a directory.
pub struct FileDatabase {
    dir: PathBuf,
    configs: JsonlTable<ServiceConfig>,
    executions: JsonlTable<ExecutionRecord>,
    templates: JsonlTable<Template>,
}

impl FileDatabase {
    /// Open a data directory. Nothing is read until first use.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            configs: JsonlTable::new(dir.join(SERVICES_FILE)),
            executions: JsonlTable::new(dir.join(EXECUTIONS_FILE)),
            templates: JsonlTable::new(dir.join(TEMPLATES_FILE)),
            dir,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Database for FileDatabase {
    type Configs<'a> = FileConfigStore<'a>;
    type Executions<'a> = FileExecutionLog<'a>;
    type Templates<'a> = FileTemplateRepository<'a>;

    async fn migrate(&self) -> DbResult<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DbError::File {
                message: format!("{}: {}", self.dir.display(), e),
            })?;
        debug!(dir = %self.dir.display(), "file store ready");
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "file"
    }

    fn configs(&self) -> Self::Configs<'_> {
        FileConfigStore {
            table: &self.configs,
        }
    }

    fn executions(&self) -> Self::Executions<'_> {
        FileExecutionLog {
            table: &self.executions,
        }
    }

    fn templates(&self) -> Self::Templates<'_> {
        FileTemplateRepository {
            table: &self.templates,
        }
    }
}

// =============================================================================
// Configs
// =============================================================================

/// Config store over `services.jsonl`, kept in insertion order.
pub struct FileConfigStore<'a> {
    table: &'a JsonlTable<ServiceConfig>,
}

fn same_key(config: &ServiceConfig, user_id: &str, tool_desc: &str) -> bool {
    config.user_id == user_id && config.tool_desc == tool_desc
}

impl<'a> ConfigStore for FileConfigStore<'a> {
    async fn resolve(&self, user_id: &str, tool_desc: &str) -> DbResult<ServiceConfig> {
        let tool_desc = canonical_tool_desc(tool_desc);
        let rows = self.table.rows().await?;
        rows.iter()
            .find(|c| same_key(c, user_id, &tool_desc))
            .cloned()
            .ok_or_else(|| {
                DbError::not_found("ServiceConfig", format!("{}/{}", user_id, tool_desc))
            })
    }

    async fn upsert(&self, config: &ServiceConfig) -> DbResult<ServiceConfig> {
        let mut config = config.clone().validated()?;
        let now = current_timestamp();

        self.table
            .update(move |rows| {
                match rows
                    .iter_mut()
                    .find(|c| same_key(c, &config.user_id, &config.tool_desc))
                {
                    Some(existing) => {
                        config.created_at = Some(timestamp_or_now(existing.created_at.as_ref()));
                        config.updated_at = Some(now);
                        *existing = config.clone();
                    }
                    None => {
                        config.created_at = Some(now.clone());
                        config.updated_at = Some(now);
                        rows.push(config.clone());
                    }
                }
                Ok(config)
            })
            .await
    }

    async fn list(&self, user_id: &str) -> DbResult<Vec<ServiceConfig>> {
        let rows = self.table.rows().await?;
        Ok(rows.iter().filter(|c| c.user_id == user_id).cloned().collect())
    }

    async fn delete(&self, user_id: &str, tool_desc: &str) -> DbResult<bool> {
        let tool_desc = canonical_tool_desc(tool_desc);
        let present = self
            .table
            .rows()
            .await?
            .iter()
            .any(|c| same_key(c, user_id, &tool_desc));
        if !present {
            return Ok(false);
        }

        self.table
            .update(|rows| {
                let before = rows.len();
                rows.retain(|c| !same_key(c, user_id, &tool_desc));
                Ok(rows.len() != before)
            })
            .await
    }
}

// =============================================================================
// Executions
// =============================================================================

/// Append-only execution log over `executions.jsonl`.
pub struct FileExecutionLog<'a> {
    table: &'a JsonlTable<ExecutionRecord>,
}

impl<'a> ExecutionLog for FileExecutionLog<'a> {
    async fn append(&self, record: &ExecutionRecord) -> DbResult<ExecutionRecord> {
        let created_at = timestamp_or_now(record.created_at.as_ref());
        self.table
            .append(|existing| {
                let next_id = existing.iter().filter_map(|r| r.id).max().unwrap_or(0) + 1;
                ExecutionRecord {
                    id: Some(next_id),
                    created_at: Some(created_at),
                    ..record.clone()
                }
            })
            .await
    }

    async fn list(&self, query: &ExecutionQuery) -> DbResult<Vec<ExecutionRecord>> {
        let rows = self.table.rows().await?;
        let limit = query.limit.unwrap_or(usize::MAX);
        Ok(rows
            .iter()
            .rev()
            .filter(|r| query.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Template repository over `templates.jsonl`.
pub struct FileTemplateRepository<'a> {
    table: &'a JsonlTable<Template>,
}

impl<'a> TemplateRepository for FileTemplateRepository<'a> {
    async fn get(&self, name: &str) -> DbResult<Template> {
        let rows = self.table.rows().await?;
        rows.iter()
            .find(|t| t.name == name)
            .cloned()
            .ok_or_else(|| DbError::not_found("Template", name))
    }

    async fn upsert(&self, template: &Template) -> DbResult<Template> {
        template.validate()?;
        let mut template = template.clone();
        let now = current_timestamp();

        self.table
            .update(move |rows| {
                match rows.iter_mut().find(|t| t.name == template.name) {
                    Some(existing) => {
                        template.version = existing.version + 1;
                        template.created_at = existing.created_at.clone();
                        template.created_by = existing.created_by.clone().or(template.created_by);
                        if template.description.is_none() {
                            template.description = existing.description.clone();
                        }
                        template.updated_at = Some(now);
                        *existing = template.clone();
                    }
                    None => {
                        template.version = 1;
                        template.created_at = Some(now.clone());
                        template.updated_at = Some(now);
                        rows.push(template.clone());
                    }
                }
                Ok(template)
            })
            .await
    }

    async fn list(&self) -> DbResult<Vec<Template>> {
        let mut rows = (*self.table.rows().await?).clone();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }
}
