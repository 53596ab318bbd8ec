// src/lib.rs
pub mod config;
pub mod connectors;
pub mod error;
pub mod mcp_server;
pub mod transport;
pub mod utils;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

// Re-export the rmcp types connectors are written against
pub use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, Implementation, InitializeRequestParam,
    InitializeResult, JsonObject, ListToolsResult, PaginatedRequestParam, ProtocolVersion,
    ServerCapabilities, Tool, ToolsCapability,
};

pub use crate::config::ServerConfig;
pub use crate::error::ConnectorError;

use crate::connectors::apple_reminders::{bridge::detect_bridge, RemindersBridge, RemindersConnector};
use crate::connectors::caldav::{CalDavConnector, CalendarClient, HttpCalDavClient};

#[async_trait]
pub trait Connector: Send + Sync {
    /// Returns the unique name of the connector.
    fn name(&self) -> &'static str;

    /// Returns a description of the connector.
    fn description(&self) -> &'static str;

    /// Returns the MCP capabilities of this connector.
    async fn capabilities(&self) -> ServerCapabilities;

    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError>;

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError>;
}

/// Connectors in registration order plus a tool name index.
///
/// Built once at startup and never mutated afterwards, so it is shared through
/// an `Arc` without locking.
pub struct ProviderRegistry {
    providers: Vec<Arc<dyn Connector>>,
    tool_index: HashMap<String, usize>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        ProviderRegistry {
            providers: Vec::new(),
            tool_index: HashMap::new(),
        }
    }

    /// Add a connector and index the tools it publishes. A tool name already
    /// claimed by an earlier connector keeps pointing at the earlier one.
    pub async fn register_provider(
        &mut self,
        provider: Arc<dyn Connector>,
    ) -> Result<(), ConnectorError> {
        let index = self.providers.len();
        let tools = provider.list_tools(None).await?.tools;
        for tool in tools {
            let name = tool.name.to_string();
            if self.tool_index.contains_key(&name) {
                warn!(
                    tool = %name,
                    connector = provider.name(),
                    "Duplicate tool name, keeping the first registration"
                );
                continue;
            }
            self.tool_index.insert(name, index);
        }
        info!(
            connector = provider.name(),
            description = provider.description(),
            "Registered connector"
        );
        self.providers.push(provider);
        Ok(())
    }

    pub fn providers(&self) -> &[Arc<dyn Connector>] {
        &self.providers
    }

    /// The connector that owns `tool_name`, if any.
    pub fn provider_for_tool(&self, tool_name: &str) -> Option<&Arc<dyn Connector>> {
        self.tool_index
            .get(tool_name)
            .and_then(|index| self.providers.get(*index))
    }

    pub async fn get_provider_tools(&self) -> Vec<Tool> {
        let mut all_tools = Vec::new();
        for provider in &self.providers {
            match provider.list_tools(None).await {
                Ok(response) => all_tools.extend(response.tools),
                Err(e) => warn!(connector = provider.name(), "Error listing tools: {}", e),
            }
        }
        all_tools
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Connect to the configured CalDAV server and register every connector the
/// configuration enables. The reminders bridge is probed once here.
pub async fn build_registry(config: &ServerConfig) -> Result<ProviderRegistry, ConnectorError> {
    info!(base_url = %config.base_url, "Connecting to CalDAV server");
    let client =
        HttpCalDavClient::connect(&config.base_url, &config.username, &config.password).await?;

    let reminders: Option<Arc<dyn RemindersBridge>> = if config.reminders_enabled {
        match detect_bridge() {
            Ok(bridge) => Some(bridge),
            Err(e) => {
                warn!("Reminder tools disabled: {}", e);
                None
            }
        }
    } else {
        info!(
            "Reminder tools disabled by {}",
            config::ENV_ENABLE_REMINDERS
        );
        None
    };

    build_registry_with(Arc::new(client), reminders).await
}

/// Register connectors over already-constructed clients.
pub async fn build_registry_with(
    calendar: Arc<dyn CalendarClient>,
    reminders: Option<Arc<dyn RemindersBridge>>,
) -> Result<ProviderRegistry, ConnectorError> {
    let mut registry = ProviderRegistry::new();

    let caldav = CalDavConnector::new(calendar).await?;
    info!(calendars = caldav.calendars().len(), "Fetched calendar list");
    registry.register_provider(Arc::new(caldav)).await?;

    if let Some(bridge) = reminders {
        registry
            .register_provider(Arc::new(RemindersConnector::new(bridge)))
            .await?;
    }

    Ok(registry)
}
