use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use caldav_core::{
    mcp_server::{JsonRpcHandler, McpServer},
    transport::StdioTransport,
    ServerConfig,
};

#[tokio::main]
async fn main() -> ExitCode {
    // stdout carries the protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting caldav-mcp {}", env!("CARGO_PKG_VERSION"));

    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let registry = match caldav_core::build_registry(&config).await {
        Ok(registry) => registry,
        Err(e) => {
            error!("Startup failed: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let server = McpServer::new(Arc::new(registry));
    let transport = StdioTransport::new(JsonRpcHandler::new(server));

    info!("MCP server ready, listening on stdio");

    if let Err(e) = transport.run().await {
        error!("Transport error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Input closed, shutting down");
    ExitCode::SUCCESS
}
