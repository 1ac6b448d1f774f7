use anyhow::{Context, Result};
use clap::Parser;
use obsquery_lib::{init_logging, ApiConfig, HttpApiClient, LoggingConfig};
use obsquery_mcp::{run_server_loop, McpServer, StdioTransport};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "MCP stdio server for log queries and background query jobs")]
struct Cli {
    /// Base URL of the query API (overrides OBSQUERY_API_URL).
    #[arg(long)]
    api_url: Option<String>,

    /// Log filter for stderr diagnostics, e.g. "debug" (overrides RUST_LOG).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env();
    if let Some(level) = cli.log_level {
        logging = logging.with_level(level);
    }
    init_logging(&logging).context("Failed to set up diagnostics")?;

    let mut config = ApiConfig::from_env();
    if let Some(url) = cli.api_url {
        config = config.with_base_url(url);
    }
    if config.api_key.is_none() {
        info!("No API key configured; tool calls will fail until OBSQUERY_API_KEY is set");
    }

    let client = HttpApiClient::shared(&config).context("Failed to create the HTTP client")?;
    info!(api_url = client.base_url(), "Starting MCP server");

    let server = McpServer::new(client);
    let mut transport = StdioTransport::stdio();
    run_server_loop(&mut transport, &server).await
}
