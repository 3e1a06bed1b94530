pub mod api_client;
mod commands;
pub mod error;
mod utils;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cli::commands::config::SetConfigRequest;
use crate::cli::commands::execution::ExecutionFilter;
use crate::cli::error::CliResult;

#[derive(Parser)]
#[command(name = "opgate")]
#[command(author, version, about = "OpenProject tool gateway CLI", long_about = None)]
pub struct Cli {
    /// Override the API URL (default: OPGATE_API_URL env or http://localhost:8000)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Service configuration commands
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Report template commands
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },
    /// Invoke a tool
    Call {
        /// Tool name, e.g. list-projects
        tool: String,
        /// Caller identity (default: global)
        #[arg(short, long)]
        user: Option<String>,
        /// Parameters as a JSON object
        #[arg(long)]
        params: Option<String>,
        /// Single parameter as key=value (repeatable)
        #[arg(short = 'p', long = "param")]
        param: Vec<String>,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// List the tool catalog
    Tools {
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Show recent executions
    Executions {
        #[arg(short, long)]
        user: Option<String>,
        #[arg(long)]
        tool: Option<String>,
        /// success or error
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Check server health
    Health {
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// List configurations of a user
    List {
        #[arg(short, long)]
        user: Option<String>,
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Create or replace a configuration
    Set {
        /// Tool name
        tool: String,
        /// OpenProject base URL
        #[arg(long)]
        endpoint: String,
        /// OpenProject API key
        #[arg(long, env = "OPENPROJECT_API_KEY", hide_env_values = true)]
        api_key: String,
        #[arg(short, long)]
        user: Option<String>,
        /// stdio, http or sse
        #[arg(long)]
        mode: Option<String>,
        /// Caller-facing URL (http and sse modes)
        #[arg(long)]
        url: Option<String>,
        /// Default parameters as a JSON object
        #[arg(long)]
        default_params: Option<String>,
    },
    /// Delete a configuration
    Delete {
        tool: String,
        #[arg(short, long)]
        user: Option<String>,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List stored templates
    List {
        /// Output format (table or json)
        #[arg(long, default_value = "table")]
        format: String,
    },
    /// Show a template
    Get {
        name: String,
        /// Output format (text or json)
        #[arg(long, default_value = "text")]
        format: String,
    },
    /// Store a template from a file
    Set {
        name: String,
        /// File with the template source
        #[arg(short, long)]
        file: PathBuf,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        created_by: Option<String>,
    },
}

async fn execute(api_client: &api_client::ApiClient, command: Commands) -> CliResult<String> {
    match command {
        Commands::Config { command } => match command {
            ConfigCommands::List { user, format } => {
                commands::config::list_configs(api_client, user.as_deref(), &format).await
            }
            ConfigCommands::Set {
                tool,
                endpoint,
                api_key,
                user,
                mode,
                url,
                default_params,
            } => {
                let request = SetConfigRequest {
                    user_id: user,
                    tool_desc: tool,
                    endpoint,
                    api_key,
                    interaction_mode: mode,
                    url,
                    default_params,
                };
                commands::config::set_config(api_client, request).await
            }
            ConfigCommands::Delete { tool, user } => {
                commands::config::delete_config(api_client, &tool, user.as_deref()).await
            }
        },
        Commands::Template { command } => match command {
            TemplateCommands::List { format } => {
                commands::template::list_templates(api_client, &format).await
            }
            TemplateCommands::Get { name, format } => {
                commands::template::get_template(api_client, &name, &format).await
            }
            TemplateCommands::Set {
                name,
                file,
                description,
                created_by,
            } => {
                commands::template::set_template(
                    api_client,
                    &name,
                    &file,
                    description.as_deref(),
                    created_by.as_deref(),
                )
                .await
            }
        },
        Commands::Call {
            tool,
            user,
            params,
            param,
            format,
        } => {
            commands::call::call_tool(
                api_client,
                &tool,
                user.as_deref(),
                params.as_deref(),
                &param,
                &format,
            )
            .await
        }
        Commands::Tools { format } => commands::call::list_tools(api_client, &format).await,
        Commands::Executions {
            user,
            tool,
            status,
            limit,
            format,
        } => {
            let filter = ExecutionFilter {
                user_id: user.as_deref(),
                tool: tool.as_deref(),
                status: status.as_deref(),
                limit,
            };
            commands::execution::list_executions(api_client, filter, &format).await
        }
        Commands::Health { format } => commands::system::health(api_client, &format).await,
    }
}

pub async fn run() -> miette::Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        // Show help when no command provided
        let _ = Cli::parse_from(["opgate", "--help"]);
        return Ok(());
    };

    let api_client = api_client::ApiClient::new(cli.api_url);
    let output = execute(&api_client, command).await?;
    println!("{}", output);
    Ok(())
}
