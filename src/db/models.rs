//! Domain models shared by every storage backend.
//!
//! These models are storage-agnostic: the SQLite backend maps them onto
//! rows, the file backend serializes them one JSON object per line.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::{DbError, DbResult};
use crate::upstream::Tool;

/// Tenant used when a caller does not identify itself.
pub const GLOBAL_USER: &str = "global";

/// Ordered parameter map. Key order is preserved end to end.
pub type Params = serde_json::Map<String, Value>;

fn default_user_id() -> String {
    GLOBAL_USER.to_string()
}

// =============================================================================
// Service configuration
// =============================================================================

/// How a caller reaches the tool. Stored as metadata; dispatch does not branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionMode {
    #[default]
    Stdio,
    #[serde(alias = "streamful_http", alias = "streamable_http")]
    Http,
    Sse,
}

impl InteractionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            InteractionMode::Stdio => "stdio",
            InteractionMode::Http => "http",
            InteractionMode::Sse => "sse",
        }
    }

    /// Whether this mode needs a caller-facing `url`.
    pub fn requires_url(&self) -> bool {
        matches!(self, InteractionMode::Http | InteractionMode::Sse)
    }
}

impl fmt::Display for InteractionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionMode {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stdio" => Ok(InteractionMode::Stdio),
            "http" | "streamful_http" | "streamable_http" => Ok(InteractionMode::Http),
            "sse" => Ok(InteractionMode::Sse),
            other => Err(DbError::validation(format!(
                "unknown interaction_mode '{}' (expected stdio, http or sse)",
                other
            ))),
        }
    }
}

/// Upstream authentication scheme.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthConfig {
    /// Basic auth with the fixed user `apikey` and `ServiceConfig::api_key` as password.
    #[default]
    ApiKey,
    #[serde(rename = "oauth")]
    OAuth {
        access_token: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        refresh_token: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token_url: Option<String>,
    },
    Jwt {
        token: String,
        /// Header carrying the token; `Authorization: Bearer` when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        header: Option<String>,
    },
}

impl AuthConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            AuthConfig::ApiKey => "api_key",
            AuthConfig::OAuth { .. } => "oauth",
            AuthConfig::Jwt { .. } => "jwt",
        }
    }

    /// Copy with every secret replaced by a masked form.
    pub fn masked(&self) -> Self {
        match self {
            AuthConfig::ApiKey => AuthConfig::ApiKey,
            AuthConfig::OAuth {
                access_token,
                refresh_token,
                token_url,
            } => AuthConfig::OAuth {
                access_token: mask_secret(access_token),
                refresh_token: refresh_token.as_deref().map(mask_secret),
                token_url: token_url.clone(),
            },
            AuthConfig::Jwt { token, header } => AuthConfig::Jwt {
                token: mask_secret(token),
                header: header.clone(),
            },
        }
    }

    fn validate(&self) -> DbResult<()> {
        match self {
            AuthConfig::ApiKey => Ok(()),
            AuthConfig::OAuth { access_token, .. } if access_token.trim().is_empty() => Err(
                DbError::validation("auth.access_token is required for oauth"),
            ),
            AuthConfig::Jwt { token, .. } if token.trim().is_empty() => {
                Err(DbError::validation("auth.token is required for jwt"))
            }
            AuthConfig::Jwt {
                header: Some(h), ..
            } if h.trim().is_empty() => Err(DbError::validation("auth.header must not be empty")),
            _ => Ok(()),
        }
    }
}

/// How to reach and authenticate to the upstream for one `(user_id, tool_desc)` pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    pub tool_desc: String,
    #[serde(default)]
    pub interaction_mode: InteractionMode,
    #[serde(default)]
    pub url: Option<String>,
    /// Upstream base URL, e.g. `https://openproject.example.com`.
    pub endpoint: String,
    pub api_key: String,
    #[serde(default)]
    pub default_params: Params,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl ServiceConfig {
    /// Minimal api-key config; the remaining fields take their defaults.
    pub fn new(
        user_id: impl Into<String>,
        tool_desc: impl Into<String>,
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tool_desc: tool_desc.into(),
            interaction_mode: InteractionMode::default(),
            url: None,
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            default_params: Params::new(),
            auth: AuthConfig::default(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Check invariants and canonicalize `tool_desc`.
    ///
    /// Every backend calls this before writing, so stored records always
    /// carry the catalog name of their tool.
    pub fn validated(mut self) -> DbResult<Self> {
        if self.user_id.trim().is_empty() {
            return Err(DbError::validation("user_id must not be empty"));
        }
        let tool = Tool::parse(&self.tool_desc).ok_or_else(|| {
            DbError::validation(format!("unknown tool_desc '{}'", self.tool_desc))
        })?;
        self.tool_desc = tool.name().to_string();

        if self.api_key.trim().is_empty() {
            return Err(DbError::validation("api_key must not be empty"));
        }
        if !is_http_url(&self.endpoint) {
            return Err(DbError::validation(format!(
                "endpoint '{}' is not an http(s) URL",
                self.endpoint
            )));
        }

        match (&self.url, self.interaction_mode.requires_url()) {
            (None, true) => {
                return Err(DbError::validation(format!(
                    "url is required for interaction_mode '{}'",
                    self.interaction_mode
                )));
            }
            (Some(url), true) if !is_http_url(url) => {
                return Err(DbError::validation(format!(
                    "url '{}' is not an http(s) URL",
                    url
                )));
            }
            (Some(_), false) => {
                return Err(DbError::validation(format!(
                    "url is only allowed for http and sse, not '{}'",
                    self.interaction_mode
                )));
            }
            _ => {}
        }

        self.auth.validate()?;
        Ok(self)
    }

    /// Copy safe to return to callers: api key and auth secrets masked.
    pub fn masked(&self) -> Self {
        Self {
            api_key: mask_secret(&self.api_key),
            auth: self.auth.masked(),
            ..self.clone()
        }
    }
}

/// Canonical catalog name for a tool identifier, or the trimmed input when unknown.
pub fn canonical_tool_desc(tool_desc: &str) -> String {
    Tool::parse(tool_desc)
        .map(|t| t.name().to_string())
        .unwrap_or_else(|| tool_desc.trim().to_string())
}

/// `***` followed by the last four characters, or just `***` for short secrets.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "***".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{}", tail)
}

fn is_http_url(s: &str) -> bool {
    Url::parse(s)
        .map(|u| matches!(u.scheme(), "http" | "https") && u.host_str().is_some())
        .unwrap_or(false)
}

// =============================================================================
// Execution log
// =============================================================================

/// Terminal status of a dispatch. Records are only written once a dispatch finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Error,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Error => "error",
        }
    }
}

impl FromStr for ExecutionStatus {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExecutionStatus::Success),
            "error" => Ok(ExecutionStatus::Error),
            other => Err(DbError::validation(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

/// One finished dispatch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    #[serde(default)]
    pub id: Option<i64>,
    pub user_id: String,
    pub tool_desc: String,
    /// Merged parameters the upstream was called with.
    pub params: Value,
    pub status: ExecutionStatus,
    #[serde(default)]
    pub result: Option<Value>,
    /// Error taxonomy kind, e.g. `ConfigNotFound`.
    #[serde(default)]
    pub error_kind: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    pub duration_ms: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Filter for listing execution records. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ExecutionQuery {
    pub user_id: Option<String>,
    pub tool_desc: Option<String>,
    pub status: Option<ExecutionStatus>,
    pub limit: Option<usize>,
}

impl ExecutionQuery {
    pub(crate) fn matches(&self, record: &ExecutionRecord) -> bool {
        self.user_id.as_ref().is_none_or(|u| *u == record.user_id)
            && self
                .tool_desc
                .as_ref()
                .is_none_or(|t| canonical_tool_desc(t) == record.tool_desc)
            && self.status.is_none_or(|s| s == record.status)
    }
}

// =============================================================================
// Templates
// =============================================================================

/// Named report template. `version` starts at 1 and grows on every update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub version: i64,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Template {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            description: None,
            created_by: None,
            version: 0,
            created_at: None,
            updated_at: None,
        }
    }

    pub(crate) fn validate(&self) -> DbResult<()> {
        if self.name.trim().is_empty() {
            return Err(DbError::validation("template name must not be empty"));
        }
        Ok(())
    }
}
