//! Upstream failure kinds.
//!
//! Status codes and bodies are kept for diagnostics only. `Display` never
//! includes the upstream body, so these messages are safe to hand to callers.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Longest upstream body excerpt kept for logging.
const BODY_EXCERPT: usize = 512;

#[derive(Error, Diagnostic, Debug)]
pub enum UpstreamError {
    #[error("invalid parameters: {0}")]
    #[diagnostic(code(opgate::upstream::invalid_params))]
    InvalidParams(String),

    #[error("upstream rejected the configured credentials (status {status})")]
    #[diagnostic(
        code(opgate::upstream::authentication),
        help("Check the api_key or auth token stored for this tool.")
    )]
    Authentication { status: u16, body: String },

    #[error("upstream rejected the request (status {status})")]
    #[diagnostic(code(opgate::upstream::rejected))]
    Rejected { status: u16, body: String },

    #[error("upstream returned a response that could not be decoded")]
    #[diagnostic(code(opgate::upstream::decode))]
    Decode { body: String },

    #[error("upstream unavailable after {attempts} attempt(s): {reason}")]
    #[diagnostic(code(opgate::upstream::transient))]
    Transient {
        attempts: u32,
        reason: String,
        status: Option<u16>,
    },

    #[error("upstream call did not complete within {}s", .0.as_secs())]
    #[diagnostic(code(opgate::upstream::timeout))]
    Timeout(Duration),
}

impl UpstreamError {
    /// Upstream status, when the failure came from an HTTP response.
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Authentication { status, .. }
            | UpstreamError::Rejected { status, .. } => Some(*status),
            UpstreamError::Transient { status, .. } => *status,
            _ => None,
        }
    }

    /// Raw body excerpt for logging.
    pub fn body(&self) -> Option<&str> {
        match self {
            UpstreamError::Authentication { body, .. }
            | UpstreamError::Rejected { body, .. }
            | UpstreamError::Decode { body } => Some(body),
            _ => None,
        }
    }
}

/// Cut a body down to a loggable excerpt on a char boundary.
pub(crate) fn excerpt(body: &str) -> String {
    if body.len() <= BODY_EXCERPT {
        return body.to_string();
    }
    let mut end = BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
