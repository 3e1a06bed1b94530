use crate::cli::api_client::ApiClient;
use crate::cli::error::{CliError, CliResult};
use crate::cli::utils::{apply_table_style, or_dash, truncate_with_ellipsis};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tabled::{Table, Tabled};

/// Masked configuration as returned by the server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ConfigView {
    pub user_id: String,
    pub tool_desc: String,
    pub interaction_mode: String,
    pub url: Option<String>,
    pub endpoint: String,
    pub api_key: String,
    #[serde(default)]
    pub default_params: Map<String, Value>,
    #[serde(default)]
    pub auth: Value,
    pub updated_at: Option<String>,
}

/// Fields for `config set`
#[derive(Debug, Default)]
pub struct SetConfigRequest {
    pub user_id: Option<String>,
    pub tool_desc: String,
    pub endpoint: String,
    pub api_key: String,
    pub interaction_mode: Option<String>,
    pub url: Option<String>,
    /// JSON object of default params
    pub default_params: Option<String>,
}

impl SetConfigRequest {
    fn into_body(self) -> CliResult<Value> {
        let mut config = json!({
            "tool_desc": self.tool_desc,
            "endpoint": self.endpoint,
            "api_key": self.api_key,
        });
        if let Some(mode) = self.interaction_mode {
            config["interaction_mode"] = Value::String(mode);
        }
        if let Some(url) = self.url {
            config["url"] = Value::String(url);
        }
        if let Some(raw) = self.default_params {
            let params: Value = serde_json::from_str(&raw).map_err(|e| {
                CliError::invalid_input(format!("--default-params is not valid JSON: {}", e))
            })?;
            if !params.is_object() {
                return Err(CliError::invalid_input(
                    "--default-params must be a JSON object",
                ));
            }
            config["default_params"] = params;
        }

        let mut body = json!({ "config": config });
        if let Some(user_id) = self.user_id {
            body["user_id"] = Value::String(user_id);
        }
        Ok(body)
    }
}

#[derive(Tabled)]
struct ConfigDisplay {
    #[tabled(rename = "Tool")]
    tool: String,
    #[tabled(rename = "Mode")]
    mode: String,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Auth")]
    auth: String,
    #[tabled(rename = "API Key")]
    api_key: String,
    #[tabled(rename = "Defaults")]
    defaults: String,
}

impl From<&ConfigView> for ConfigDisplay {
    fn from(config: &ConfigView) -> Self {
        let defaults = if config.default_params.is_empty() {
            "-".to_string()
        } else {
            truncate_with_ellipsis(&Value::Object(config.default_params.clone()).to_string(), 40)
        };
        Self {
            tool: config.tool_desc.clone(),
            mode: config.interaction_mode.clone(),
            endpoint: truncate_with_ellipsis(&config.endpoint, 40),
            auth: or_dash(config.auth.get("type").and_then(Value::as_str)),
            api_key: config.api_key.clone(),
            defaults,
        }
    }
}

/// List the configurations of a user
pub async fn list_configs(
    api_client: &ApiClient,
    user_id: Option<&str>,
    format: &str,
) -> CliResult<String> {
    let mut request = api_client.get("/mcp-config");
    if let Some(user) = user_id {
        request = request.query(&[("user_id", user)]);
    }

    let configs: Vec<ConfigView> = ApiClient::handle_response(request.send().await?).await?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&configs)?),
        _ => Ok(format_table(&configs)),
    }
}

fn format_table(configs: &[ConfigView]) -> String {
    if configs.is_empty() {
        return "No configurations found.".to_string();
    }

    let rows: Vec<ConfigDisplay> = configs.iter().map(|c| c.into()).collect();
    let mut table = Table::new(rows);
    apply_table_style(&mut table);
    table.to_string()
}

/// Create or replace a configuration
pub async fn set_config(api_client: &ApiClient, request: SetConfigRequest) -> CliResult<String> {
    let body = request.into_body()?;
    let response = api_client.post("/mcp-config").json(&body).send().await?;

    let stored: ConfigView = ApiClient::handle_response(response).await?;
    Ok(format!(
        "✓ Stored configuration: {} for {}",
        stored.tool_desc, stored.user_id
    ))
}

/// Delete a configuration
pub async fn delete_config(
    api_client: &ApiClient,
    tool_desc: &str,
    user_id: Option<&str>,
) -> CliResult<String> {
    let mut request = api_client.delete(&format!("/mcp-config/{}", tool_desc));
    if let Some(user) = user_id {
        request = request.query(&[("user_id", user)]);
    }

    let _: Value = ApiClient::handle_response(request.send().await?).await?;
    Ok(format!("✓ Deleted configuration: {}", tool_desc))
}
