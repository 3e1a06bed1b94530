//! Upstream project-management API access.
//!
//! - `catalog`: the fixed tool enumeration and request building
//! - `retry`: backoff policy
//! - `client`: reqwest-based OpenProject client implementing [`Upstream`]

mod catalog;
mod client;
mod error;
mod retry;

#[cfg(test)]
mod client_test;

use std::future::Future;

use serde_json::Value;

pub use catalog::{ReportWeek, Tool, ToolInfo, UpstreamRequest, WEEKLY_REPORT_TEMPLATE};
pub use client::OpenProjectClient;
pub use error::UpstreamError;
pub(crate) use error::excerpt;
pub use retry::RetryPolicy;

use crate::db::{Params, ServiceConfig};

/// One logical upstream call, retries included.
///
/// Implementations issue exactly one network request per attempt and map
/// every failure onto an [`UpstreamError`] kind.
pub trait Upstream: Send + Sync + 'static {
    fn invoke(
        &self,
        config: &ServiceConfig,
        tool: Tool,
        params: &Params,
    ) -> impl Future<Output = Result<Value, UpstreamError>> + Send;
}
