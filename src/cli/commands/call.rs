use crate::cli::api_client::ApiClient;
use crate::cli::error::CliResult;
use crate::cli::utils::{apply_table_style, build_params, join_or_dash, truncate_with_ellipsis};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tabled::{Table, Tabled};

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolView {
    pub name: String,
    pub description: String,
    pub required_params: Vec<String>,
    pub optional_params: Vec<String>,
    pub report: bool,
}

#[derive(Tabled)]
struct ToolDisplay {
    #[tabled(rename = "Tool")]
    name: String,
    #[tabled(rename = "Required")]
    required: String,
    #[tabled(rename = "Optional")]
    optional: String,
    #[tabled(rename = "Report")]
    report: String,
    #[tabled(rename = "Description")]
    description: String,
}

impl From<&ToolView> for ToolDisplay {
    fn from(tool: &ToolView) -> Self {
        Self {
            name: tool.name.clone(),
            required: join_or_dash(&tool.required_params),
            optional: join_or_dash(&tool.optional_params),
            report: if tool.report { "yes" } else { "no" }.to_string(),
            description: truncate_with_ellipsis(&tool.description, 50),
        }
    }
}

/// List the tool catalog
pub async fn list_tools(api_client: &ApiClient, format: &str) -> CliResult<String> {
    let tools: Vec<ToolView> =
        ApiClient::handle_response(api_client.get("/mcp/tools").send().await?).await?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&tools)?),
        _ => {
            let rows: Vec<ToolDisplay> = tools.iter().map(|t| t.into()).collect();
            let mut table = Table::new(rows);
            apply_table_style(&mut table);
            Ok(table.to_string())
        }
    }
}

/// Invoke a tool
///
/// `json` prints the full payload; otherwise a rendered report is printed as
/// text and raw results as pretty JSON.
pub async fn call_tool(
    api_client: &ApiClient,
    tool_desc: &str,
    user_id: Option<&str>,
    params_json: Option<&str>,
    pairs: &[String],
    format: &str,
) -> CliResult<String> {
    let params = build_params(params_json, pairs)?;

    let mut request = api_client
        .post(&format!("/mcp/{}", tool_desc))
        .json(&json!({ "params": params }));
    if let Some(user) = user_id {
        request = request.query(&[("user_id", user)]);
    }

    let payload: Value = ApiClient::handle_response(request.send().await?).await?;

    match (format, &payload["result"]) {
        ("json", _) => Ok(serde_json::to_string_pretty(&payload)?),
        (_, Value::String(report)) => Ok(report.clone()),
        (_, result) => Ok(serde_json::to_string_pretty(result)?),
    }
}
