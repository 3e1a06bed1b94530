//! Report templates: a small sandboxed template language plus a compiled cache.
//!
//! Rendering never touches the network or the filesystem; callers hand in
//! fully materialized JSON data. Compiled templates are cached by name and
//! tagged with the SHA-256 of their source, so editing a stored template
//! recompiles on next use.

mod eval;
mod syntax;


use std::sync::Arc;

use dashmap::DashMap;
use miette::Diagnostic;
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use syntax::Node;

/// Template used for `weekly-report` when the store holds none.
pub const DEFAULT_WEEKLY_TEMPLATE: &str = "# Project Weekly Report
**Project**: {{ project.name }}
**Week**: {{ week }}
{{ summary }}

**Tasks**:
{% for task in work_packages %}
- #{{ task.id }} {{ task.subject }} (Status: {{ task.status | default(\"Unknown\") }}{% if task.assignee %}, Assignee: {{ task.assignee }}{% endif %})
{% endfor %}
{% if not work_packages %}
_No work packages were updated this week._
{% endif %}
";

#[derive(Error, Diagnostic, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("template syntax error at line {line}: {message}")]
    #[diagnostic(
        code(opgate::render::syntax),
        help("Supported blocks: output, for/endfor, if/else/endif and comments.")
    )]
    Syntax { line: usize, message: String },
}

impl RenderError {
    pub(crate) fn syntax(line: usize, message: impl Into<String>) -> Self {
        RenderError::Syntax {
            line,
            message: message.into(),
        }
    }
}

/// A parsed template ready to render.
#[derive(Debug)]
pub struct CompiledTemplate {
    nodes: Vec<Node>,
}

impl CompiledTemplate {
    pub fn compile(source: &str) -> Result<Self, RenderError> {
        Ok(Self {
            nodes: syntax::parse(source)?,
        })
    }

    pub fn render(&self, data: &Value) -> String {
        eval::render_nodes(&self.nodes, data)
    }
}

struct CacheEntry {
    hash: String,
    compiled: Arc<CompiledTemplate>,
}

/// Renders named templates, compiling each source once.
#[derive(Default)]
pub struct TemplateRenderer {
    cache: DashMap<String, CacheEntry>,
}

impl TemplateRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render `source` under `name`, reusing the compiled form when the
    /// source hash matches the cached one.
    pub fn render(&self, name: &str, source: &str, data: &Value) -> Result<String, RenderError> {
        Ok(self.compiled(name, source)?.render(data))
    }

    /// Check a source for syntax errors without caching it.
    pub fn check(source: &str) -> Result<(), RenderError> {
        CompiledTemplate::compile(source).map(|_| ())
    }

    pub fn invalidate(&self, name: &str) {
        if self.cache.remove(name).is_some() {
            debug!(template = name, "Invalidated compiled template");
        }
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.cache.contains_key(name)
    }

    fn compiled(&self, name: &str, source: &str) -> Result<Arc<CompiledTemplate>, RenderError> {
        let hash = content_hash(source);
        if let Some(entry) = self.cache.get(name) {
            if entry.hash == hash {
                return Ok(entry.compiled.clone());
            }
        }

        let compiled = Arc::new(CompiledTemplate::compile(source)?);
        debug!(template = name, hash = %hash, "Compiled template");
        self.cache.insert(
            name.to_string(),
            CacheEntry {
                hash,
                compiled: compiled.clone(),
            },
        );
        Ok(compiled)
    }
}

fn content_hash(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}
