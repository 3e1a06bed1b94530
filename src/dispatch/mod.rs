//! Transport-neutral dispatch of tool calls.
//!
//! A [`Dispatcher`] turns "invoke tool T with params P as user U" into
//! one upstream call:
//!
//! 1. validate the tool name
//! 2. wait for the `(user, tool)` execution slot
//! 3. resolve the caller's [`ServiceConfig`]
//! 4. merge default params (request values win)
//! 5. call the upstream
//! 6. render report tools through their template
//! 7. append an execution record (best effort)
//!
//! The pipeline runs on its own task, so a transport that stops waiting
//! never abandons an upstream call halfway.

mod error;
mod report;
mod slots;


use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Value, json};
use tracing::{Instrument, debug, error, info_span, warn};

pub use error::{DispatchError, DispatchResult};
pub use slots::DispatchKey;

use crate::db::{
    ConfigStore, Database, DbError, ExecutionLog, ExecutionRecord, ExecutionStatus, GLOBAL_USER,
    Params, ServiceConfig, TemplateRepository,
};
use crate::render::{DEFAULT_WEEKLY_TEMPLATE, TemplateRenderer};
use crate::upstream::{ReportWeek, Tool, Upstream, UpstreamError, excerpt};
use slots::SlotRegistry;

/// A normalized tool call, whatever transport it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub user_id: String,
    pub tool_desc: String,
    pub params: Params,
}

impl DispatchRequest {
    pub fn new(user_id: impl Into<String>, tool_desc: impl Into<String>, params: Params) -> Self {
        Self {
            user_id: user_id.into(),
            tool_desc: tool_desc.into(),
            params,
        }
    }

    /// Request on behalf of the shared `global` tenant.
    pub fn global(tool_desc: impl Into<String>, params: Params) -> Self {
        Self::new(GLOBAL_USER, tool_desc, params)
    }
}

/// Result of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchOutcome {
    /// Canonical tool name.
    pub tool: String,
    /// Parameters after merging config defaults.
    pub params: Params,
    /// Raw upstream result.
    pub result: Value,
    /// Rendered text for report tools.
    pub report: Option<String>,
    /// Reused from an identical dispatch that finished while this one queued.
    pub shared: bool,
}

impl DispatchOutcome {
    /// Transport-neutral success body.
    pub fn payload(&self) -> Value {
        match &self.report {
            Some(report) => json!({
                "result": report,
                "raw_data": self.result,
                "tool": self.tool,
                "params": self.params,
            }),
            None => json!({
                "result": self.result,
                "tool": self.tool,
                "params": self.params,
            }),
        }
    }
}

struct Inner<D: Database, U: Upstream> {
    db: Arc<D>,
    upstream: U,
    renderer: Arc<TemplateRenderer>,
    slots: SlotRegistry,
}

/// Orchestrates config resolution, upstream calls, rendering and logging.
pub struct Dispatcher<D: Database, U: Upstream> {
    inner: Arc<Inner<D, U>>,
}

impl<D: Database, U: Upstream> Clone for Dispatcher<D, U> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D: Database, U: Upstream> Dispatcher<D, U> {
    pub fn new(db: Arc<D>, upstream: U, renderer: Arc<TemplateRenderer>) -> Self {
        Self {
            inner: Arc::new(Inner {
                db,
                upstream,
                renderer,
                slots: SlotRegistry::default(),
            }),
        }
    }

    pub fn db(&self) -> &Arc<D> {
        &self.inner.db
    }

    pub fn renderer(&self) -> &Arc<TemplateRenderer> {
        &self.inner.renderer
    }

    /// Keys with an active or queued dispatch.
    pub fn active_slots(&self) -> usize {
        self.inner.slots.len()
    }

    /// Run one tool call to completion.
    pub async fn dispatch(&self, request: DispatchRequest) -> DispatchResult<DispatchOutcome> {
        let inner = Arc::clone(&self.inner);
        let span = info_span!(
            "dispatch",
            user_id = %request.user_id,
            tool = %request.tool_desc
        );
        let context = (request.user_id.clone(), request.tool_desc.clone());

        tokio::spawn(async move { inner.run(request).await }.instrument(span))
            .await
            .map_err(|e| {
                error!(
                    user_id = %context.0,
                    tool = %context.1,
                    error = %e,
                    "Dispatch task failed"
                );
                DispatchError::Internal("dispatch task failed".to_string())
            })?
    }
}

impl<D: Database, U: Upstream> Inner<D, U> {
    async fn run(&self, request: DispatchRequest) -> DispatchResult<DispatchOutcome> {
        let started = Instant::now();

        let tool = match validate(&request) {
            Ok(tool) => tool,
            Err(err) => {
                let tool_desc = request.tool_desc.clone();
                self.record_failure(&request, &tool_desc, &err, started).await;
                return Err(err);
            }
        };

        let ticket = self.slots.enter(DispatchKey {
            user_id: request.user_id.clone(),
            tool,
        });
        let mut slot = ticket.acquire().await;
        debug!("Execution slot acquired");

        if let Some(mut outcome) = slot.coalesced(&request.params) {
            debug!("Reusing result of identical dispatch");
            outcome.shared = true;
            self.record_success(&request, &outcome, None, started).await;
            return Ok(outcome);
        }

        let result = self.execute(tool, &request, started).await;
        slot.complete(&request.params, result.as_ref().ok());
        result
    }

    async fn execute(
        &self,
        tool: Tool,
        request: &DispatchRequest,
        started: Instant,
    ) -> DispatchResult<DispatchOutcome> {
        let (params, result) = match self.call_upstream(tool, request).await {
            Ok(called) => called,
            Err(err) => {
                self.record_failure(request, tool.name(), &err, started).await;
                return Err(err);
            }
        };

        let mut outcome = DispatchOutcome {
            tool: tool.name().to_string(),
            params,
            result,
            report: None,
            shared: false,
        };

        if let Some(template) = tool.template_name() {
            match self.render_report(tool, template, request, &outcome).await {
                Ok(text) => outcome.report = Some(text),
                Err(err) => {
                    // The upstream call itself succeeded and is logged as such.
                    self.record_success(request, &outcome, Some(&err), started)
                        .await;
                    return Err(err);
                }
            }
        }

        self.record_success(request, &outcome, None, started).await;
        Ok(outcome)
    }

    async fn call_upstream(
        &self,
        tool: Tool,
        request: &DispatchRequest,
    ) -> DispatchResult<(Params, Value)> {
        let config = self.resolve(&request.user_id, tool).await?;
        let params = merge_params(&config.default_params, &request.params);
        tool.build_request(&params)?;

        debug!(endpoint = %config.endpoint, "Calling upstream");
        match self.upstream.invoke(&config, tool, &params).await {
            Ok(value) => Ok((params, value)),
            Err(err) => {
                log_upstream_failure(&err);
                Err(err.into())
            }
        }
    }

    async fn resolve(&self, user_id: &str, tool: Tool) -> DispatchResult<ServiceConfig> {
        match self.db.configs().resolve(user_id, tool.name()).await {
            Ok(config) => Ok(config),
            Err(DbError::NotFound { .. }) => Err(DispatchError::ConfigNotFound {
                user_id: user_id.to_string(),
                tool_desc: tool.name().to_string(),
            }),
            Err(err) => {
                error!(user_id, tool = tool.name(), error = %err, "Config lookup failed");
                Err(DispatchError::Internal("configuration store unavailable".to_string()))
            }
        }
    }

    async fn render_report(
        &self,
        tool: Tool,
        template: &str,
        request: &DispatchRequest,
        outcome: &DispatchOutcome,
    ) -> DispatchResult<String> {
        let source = match self.db.templates().get(template).await {
            Ok(stored) => stored.content,
            Err(DbError::NotFound { .. }) => DEFAULT_WEEKLY_TEMPLATE.to_string(),
            Err(err) => {
                warn!(template, error = %err, "Template lookup failed, using built-in");
                DEFAULT_WEEKLY_TEMPLATE.to_string()
            }
        };

        let week = ReportWeek::from_params(&outcome.params)?;
        let data = report::report_context(
            &request.user_id,
            tool,
            &outcome.params,
            &week,
            &outcome.result,
        );

        debug!(template, "Rendering report");
        Ok(self.renderer.render(template, &source, &data)?)
    }

    async fn record_success(
        &self,
        request: &DispatchRequest,
        outcome: &DispatchOutcome,
        render_error: Option<&DispatchError>,
        started: Instant,
    ) {
        let record = ExecutionRecord {
            id: None,
            user_id: request.user_id.clone(),
            tool_desc: outcome.tool.clone(),
            params: Value::Object(outcome.params.clone()),
            status: ExecutionStatus::Success,
            result: Some(outcome.result.clone()),
            error_kind: render_error.map(|e| e.kind().to_string()),
            error_message: render_error.map(|e| e.to_string()),
            duration_ms: elapsed_ms(started),
            created_at: None,
        };
        self.append(record).await;
    }

    async fn record_failure(
        &self,
        request: &DispatchRequest,
        tool_desc: &str,
        err: &DispatchError,
        started: Instant,
    ) {
        let params = Value::Object(request.params.clone());
        if let DispatchError::Internal(_) = err {
            error!(
                user_id = %request.user_id,
                tool = tool_desc,
                params = %params,
                error = %err,
                "Dispatch failed with internal fault"
            );
        } else {
            debug!(kind = err.kind(), error = %err, "Dispatch failed");
        }

        let record = ExecutionRecord {
            id: None,
            user_id: request.user_id.clone(),
            tool_desc: tool_desc.to_string(),
            params,
            status: ExecutionStatus::Error,
            result: None,
            error_kind: Some(err.kind().to_string()),
            error_message: Some(err.to_string()),
            duration_ms: elapsed_ms(started),
            created_at: None,
        };
        self.append(record).await;
    }

    async fn append(&self, record: ExecutionRecord) {
        if let Err(err) = self.db.executions().append(&record).await {
            error!(
                user_id = %record.user_id,
                tool = %record.tool_desc,
                status = record.status.as_str(),
                error = %err,
                "Failed to record execution"
            );
        }
    }
}

fn validate(request: &DispatchRequest) -> DispatchResult<Tool> {
    if request.user_id.trim().is_empty() {
        return Err(DispatchError::Validation("user_id must not be empty".to_string()));
    }
    if request.tool_desc.trim().is_empty() {
        return Err(DispatchError::Validation("tool name must not be empty".to_string()));
    }
    Tool::parse(&request.tool_desc)
        .ok_or_else(|| DispatchError::Validation(format!("unknown tool '{}'", request.tool_desc)))
}

/// Config defaults overlaid with request params; request values win.
pub fn merge_params(defaults: &Params, request: &Params) -> Params {
    let mut merged = defaults.clone();
    for (key, value) in request {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

fn log_upstream_failure(err: &UpstreamError) {
    match err.body() {
        Some(body) => warn!(
            status = ?err.status(),
            body = %excerpt(body),
            error = %err,
            "Upstream call failed"
        ),
        None => warn!(status = ?err.status(), error = %err, "Upstream call failed"),
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().try_into().unwrap_or(u64::MAX)
}
