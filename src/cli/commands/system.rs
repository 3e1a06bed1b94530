use crate::cli::api_client::ApiClient;
use crate::cli::error::CliResult;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub version: String,
    pub storage: String,
    pub uptime_seconds: u64,
}

/// Check the server
pub async fn health(api_client: &ApiClient, format: &str) -> CliResult<String> {
    let health: Health =
        ApiClient::handle_response(api_client.get("/health").send().await?).await?;

    match format {
        "json" => Ok(serde_json::to_string_pretty(&health)?),
        _ => Ok(format!(
            "{} at {} (version {}, storage {}, up {}s)",
            health.status,
            api_client.base_url(),
            health.version,
            health.storage,
            health.uptime_seconds
        )),
    }
}
