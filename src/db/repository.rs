//! Repository traits for data access abstraction.
//!
//! The dispatcher and every transport depend only on these traits. Both the
//! SQLite and the file backend implement them with identical semantics for
//! resolve/upsert/delete; only `list` ordering is backend-specific.

use std::future::Future;

use crate::db::{DbResult, ExecutionQuery, ExecutionRecord, ServiceConfig, Template};

/// Durable mapping from `(user_id, tool_desc)` to a [`ServiceConfig`].
pub trait ConfigStore {
    /// Fetch the config for a key. `DbError::NotFound` when absent.
    fn resolve(
        &self,
        user_id: &str,
        tool_desc: &str,
    ) -> impl Future<Output = DbResult<ServiceConfig>> + Send;

    /// Insert or replace by `(user_id, tool_desc)`.
    ///
    /// Fails with `DbError::Validation` when the config breaks an invariant.
    /// A replaced record keeps its position and `created_at`.
    fn upsert(
        &self,
        config: &ServiceConfig,
    ) -> impl Future<Output = DbResult<ServiceConfig>> + Send;

    /// All configs of a user in backend order (insertion order for files,
    /// primary-key order for SQLite).
    fn list(&self, user_id: &str) -> impl Future<Output = DbResult<Vec<ServiceConfig>>> + Send;

    /// Remove a config. Returns true if a record was removed.
    fn delete(&self, user_id: &str, tool_desc: &str)
    -> impl Future<Output = DbResult<bool>> + Send;
}

/// Append-only record of finished dispatches.
pub trait ExecutionLog {
    fn append(
        &self,
        record: &ExecutionRecord,
    ) -> impl Future<Output = DbResult<ExecutionRecord>> + Send;

    /// Newest first.
    fn list(
        &self,
        query: &ExecutionQuery,
    ) -> impl Future<Output = DbResult<Vec<ExecutionRecord>>> + Send;
}

/// Repository for named report templates.
pub trait TemplateRepository {
    fn get(&self, name: &str) -> impl Future<Output = DbResult<Template>> + Send;

    /// Insert or replace by name; bumps `version`.
    fn upsert(&self, template: &Template) -> impl Future<Output = DbResult<Template>> + Send;

    fn list(&self) -> impl Future<Output = DbResult<Vec<Template>>> + Send;
}

/// Combined storage interface.
///
/// Repository accessors use generic associated types so callers stay
/// generic without dynamic dispatch.
pub trait Database: Send + Sync + 'static {
    type Configs<'a>: ConfigStore + Send + Sync
    where
        Self: 'a;
    type Executions<'a>: ExecutionLog + Send + Sync
    where
        Self: 'a;
    type Templates<'a>: TemplateRepository + Send + Sync
    where
        Self: 'a;

    /// Prepare the backing store (schema migrations, data files).
    fn migrate(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Short backend name for health output.
    fn backend(&self) -> &'static str;

    fn configs(&self) -> Self::Configs<'_>;

    fn executions(&self) -> Self::Executions<'_>;

    fn templates(&self) -> Self::Templates<'_>;
}
