use crate::cli::api_client::ApiClient;
use crate::cli::error::{CliError, CliResult};
use crate::cli::utils::{apply_table_style, or_dash, truncate_with_ellipsis};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tabled::{Table, Tabled};

#[derive(Debug, Serialize, Deserialize)]
pub struct TemplateView {
    pub name: String,
    pub content: String,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub version: i64,
    pub updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct TemplateBody<'a> {
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_by: Option<&'a str>,
}

#[derive(Tabled)]
struct TemplateDisplay {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: i64,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

impl From<&TemplateView> for TemplateDisplay {
    fn from(t: &TemplateView) -> Self {
        Self {
            name: t.name.clone(),
            version: t.version,
            description: t
                .description
                .as_deref()
                .map(|d| truncate_with_ellipsis(d, 50))
                .unwrap_or_else(|| "-".to_string()),
            updated: or_dash(t.updated_at.as_deref()),
        }
    }
}

/// List stored templates
pub async fn list_templates(api_client: &ApiClient, format: &str) -> CliResult<String> {
    let templates: Vec<TemplateView> =
        ApiClient::handle_response(api_client.get("/templates").send().await?).await?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&templates)?),
        _ if templates.is_empty() => Ok("No templates stored.".to_string()),
        _ => {
            let rows: Vec<TemplateDisplay> = templates.iter().map(|t| t.into()).collect();
            let mut table = Table::new(rows);
            apply_table_style(&mut table);
            Ok(table.to_string())
        }
    }
}

/// Show a template; the plain format prints just its source
pub async fn get_template(api_client: &ApiClient, name: &str, format: &str) -> CliResult<String> {
    let template: TemplateView = ApiClient::handle_response(
        api_client
            .get(&format!("/templates/{}", name))
            .send()
            .await?,
    )
    .await?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&template)?),
        _ => Ok(template.content),
    }
}

/// Store a template from a file
pub async fn set_template(
    api_client: &ApiClient,
    name: &str,
    file: &Path,
    description: Option<&str>,
    created_by: Option<&str>,
) -> CliResult<String> {
    let content = std::fs::read_to_string(file).map_err(|source| CliError::Io {
        path: file.display().to_string(),
        source,
    })?;

    let response = api_client
        .post(&format!("/templates/{}", name))
        .json(&TemplateBody {
            content,
            description,
            created_by,
        })
        .send()
        .await?;

    let stored: TemplateView = ApiClient::handle_response(response).await?;
    Ok(format!(
        "✓ Stored template: {} (version {})",
        stored.name, stored.version
    ))
}
