mod config;
mod server;

use std::sync::Arc;

use anyhow::{Context, Result};
use caldav_mcp_core::CalendarTools;
use caldav_mcp_provider::CalDavSession;
use clap::Parser;
use rmcp::{ServiceExt, transport::stdio};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, Config};
use crate::server::CalendarServer;

#[tokio::main]
async fn main() -> Result<()> {
    // Real environment variables win over .env
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = Config::from_cli(cli).context("Invalid configuration")?;
    tracing::info!(
        url = %config.connection.url,
        user = %config.connection.username,
        timezone = %config.timezone,
        "Starting caldav-mcp"
    );

    let session = CalDavSession::connect(&config.connection)
        .context("Failed to set up CalDAV client")?;
    let tools = CalendarTools::new(Arc::new(session), config.timezone);

    let service = CalendarServer::new(tools)
        .serve(stdio())
        .await
        .context("Failed to start MCP server")?;
    service.waiting().await?;

    tracing::info!("Client disconnected, shutting down");
    Ok(())
}

/// Logs go to stderr; stdout carries protocol frames only.
fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}
