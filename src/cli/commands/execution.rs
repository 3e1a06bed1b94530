use crate::cli::api_client::ApiClient;
use crate::cli::error::CliResult;
use crate::cli::utils::{apply_table_style, or_dash, truncate_with_ellipsis};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tabled::{Table, Tabled};

#[derive(Debug, Serialize, Deserialize)]
pub struct ExecutionView {
    pub id: Option<i64>,
    pub user_id: String,
    pub tool_desc: String,
    pub params: Value,
    pub status: String,
    pub result: Option<Value>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
    pub duration_ms: u64,
    pub created_at: Option<String>,
}

/// Filters for `executions`
#[derive(Debug, Default)]
pub struct ExecutionFilter<'a> {
    pub user_id: Option<&'a str>,
    pub tool: Option<&'a str>,
    pub status: Option<&'a str>,
    pub limit: Option<u32>,
}

#[derive(Tabled)]
struct ExecutionDisplay {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Tool")]
    tool: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Error")]
    error: String,
    #[tabled(rename = "ms")]
    duration_ms: u64,
    #[tabled(rename = "At")]
    created_at: String,
}

impl From<&ExecutionView> for ExecutionDisplay {
    fn from(e: &ExecutionView) -> Self {
        let error = match (&e.error_kind, &e.error_message) {
            (Some(kind), Some(message)) => {
                truncate_with_ellipsis(&format!("{}: {}", kind, message), 50)
            }
            (Some(kind), None) => kind.clone(),
            _ => "-".to_string(),
        };
        Self {
            id: e.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            user: e.user_id.clone(),
            tool: e.tool_desc.clone(),
            status: e.status.clone(),
            error,
            duration_ms: e.duration_ms,
            created_at: or_dash(e.created_at.as_deref()),
        }
    }
}

/// List execution records, newest first
pub async fn list_executions(
    api_client: &ApiClient,
    filter: ExecutionFilter<'_>,
    format: &str,
) -> CliResult<String> {
    let mut request = api_client.get("/executions");

    if let Some(user) = filter.user_id {
        request = request.query(&[("user_id", user)]);
    }
    if let Some(tool) = filter.tool {
        request = request.query(&[("tool", tool)]);
    }
    if let Some(status) = filter.status {
        request = request.query(&[("status", status)]);
    }
    if let Some(limit) = filter.limit {
        request = request.query(&[("limit", limit.to_string())]);
    }

    let records: Vec<ExecutionView> = ApiClient::handle_response(request.send().await?).await?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&records)?),
        _ if records.is_empty() => Ok("No executions found.".to_string()),
        _ => {
            let rows: Vec<ExecutionDisplay> = records.iter().map(|r| r.into()).collect();
            let mut table = Table::new(rows);
            apply_table_style(&mut table);
            Ok(table.to_string())
        }
    }
}
