//! Dispatch error taxonomy shared by every transport.

use miette::Diagnostic;
use serde_json::{Value, json};
use thiserror::Error;

use crate::render::RenderError;
use crate::upstream::UpstreamError;

/// Dispatch-level errors.
///
/// Messages are safe to hand to callers: they never carry upstream bodies
/// or stored credentials.
#[derive(Error, Diagnostic, Debug, Clone, PartialEq)]
pub enum DispatchError {
    #[error("{0}")]
    #[diagnostic(code(opgate::dispatch::validation))]
    Validation(String),

    #[error("no configuration for tool '{tool_desc}' and user '{user_id}'")]
    #[diagnostic(
        code(opgate::dispatch::config_not_found),
        help("Create one with POST /mcp-config or `opgate config set`.")
    )]
    ConfigNotFound { user_id: String, tool_desc: String },

    #[error("upstream rejected the configured credentials")]
    #[diagnostic(code(opgate::dispatch::authentication))]
    Authentication { status: u16 },

    #[error("upstream unavailable: {0}")]
    #[diagnostic(code(opgate::dispatch::upstream_transient))]
    Transient(String),

    #[error("upstream did not respond within {0}s")]
    #[diagnostic(code(opgate::dispatch::upstream_timeout))]
    Timeout(u64),

    #[error("{}", rejected_message(.status))]
    #[diagnostic(code(opgate::dispatch::upstream_rejected))]
    Rejected { status: Option<u16> },

    #[error("report rendering failed: {0}")]
    #[diagnostic(code(opgate::dispatch::render))]
    Render(#[from] RenderError),

    #[error("internal error: {0}")]
    #[diagnostic(code(opgate::dispatch::internal))]
    Internal(String),
}

fn rejected_message(status: &Option<u16>) -> String {
    match status {
        Some(status) => format!("upstream rejected the request (status {})", status),
        None => "upstream returned a response that could not be decoded".to_string(),
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    /// Taxonomy kind as reported to callers and stored in the execution log.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::Validation(_) => "ValidationError",
            DispatchError::ConfigNotFound { .. } => "ConfigNotFound",
            DispatchError::Authentication { .. } => "AuthenticationFailure",
            DispatchError::Transient(_) => "UpstreamTransient",
            DispatchError::Timeout(_) => "UpstreamTimeout",
            DispatchError::Rejected { .. } => "UpstreamRejected",
            DispatchError::Render(_) => "RenderError",
            DispatchError::Internal(_) => "InternalFault",
        }
    }

    /// Transport-neutral error body.
    pub fn payload(&self) -> Value {
        json!({
            "error": self.to_string(),
            "kind": self.kind(),
        })
    }
}

impl From<UpstreamError> for DispatchError {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::InvalidParams(message) => DispatchError::Validation(message),
            UpstreamError::Authentication { status, .. } => {
                DispatchError::Authentication { status }
            }
            UpstreamError::Rejected { status, .. } => DispatchError::Rejected {
                status: Some(status),
            },
            UpstreamError::Decode { .. } => DispatchError::Rejected { status: None },
            UpstreamError::Transient {
                attempts, reason, ..
            } => DispatchError::Transient(format!(
                "{} (after {} attempt(s))",
                reason, attempts
            )),
            UpstreamError::Timeout(limit) => DispatchError::Timeout(limit.as_secs()),
        }
    }
}
