use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{utils::error_result, ConnectorError, ProviderRegistry};
use rmcp::model::*;

pub const SERVER_NAME: &str = "caldav-mcp";

/// MCP Server implementation that wraps the ProviderRegistry
pub struct McpServer {
    registry: Arc<ProviderRegistry>,
}

impl McpServer {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Get aggregated capabilities from all connectors
    pub async fn get_capabilities(&self) -> ServerCapabilities {
        let mut capabilities = ServerCapabilities::default();
        for connector in self.registry.providers() {
            let conn_caps = connector.capabilities().await;
            if conn_caps.tools.is_some() {
                capabilities.tools = conn_caps.tools;
            }
        }
        capabilities
    }

    /// Handle initialize request
    pub async fn handle_initialize(
        &self,
        request: InitializeRequestParam,
    ) -> Result<InitializeResult, ConnectorError> {
        info!(
            client = %request.client_info.name,
            client_version = %request.client_info.version,
            "MCP Server initializing"
        );

        Ok(InitializeResult {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: self.get_capabilities().await,
            server_info: Implementation {
                name: SERVER_NAME.to_string(),
                title: None,
                version: env!("CARGO_PKG_VERSION").to_string(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Create, list and delete CalDAV calendar events, and manage Apple Reminders when running on macOS."
                    .to_string(),
            ),
        })
    }

    /// Handle list_tools request - aggregates from all connectors in registration order
    pub async fn handle_list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        Ok(ListToolsResult {
            tools: self.registry.get_provider_tools().await,
            next_cursor: None,
        })
    }

    /// Handle call_tool request - routes to the connector that owns the tool.
    ///
    /// Validation failures and unknown tools surface as JSON-RPC errors. Every
    /// other failure becomes a tool result flagged `isError`.
    pub async fn handle_call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let tool_name = request.name.to_string();
        let connector = self
            .registry
            .provider_for_tool(&tool_name)
            .ok_or_else(|| ConnectorError::ToolNotFound(tool_name.clone()))?;

        debug!(tool = %tool_name, connector = connector.name(), "Calling tool");
        match connector.call_tool(request).await {
            Ok(result) => Ok(result),
            Err(e) if e.is_protocol_error() => {
                debug!(tool = %tool_name, "Rejected tool call: {}", e);
                Err(e)
            }
            Err(e) => {
                warn!(tool = %tool_name, kind = e.code_str(), "Tool call failed: {}", e);
                Ok(error_result(e.to_string()))
            }
        }
    }
}

/// JSON-RPC message handler for the MCP server
pub struct JsonRpcHandler {
    server: McpServer,
}

impl JsonRpcHandler {
    pub fn new(server: McpServer) -> Self {
        Self { server }
    }

    /// Process a JSON-RPC message. Notifications (no `id`) yield no response.
    pub async fn handle_request(&self, request: Value) -> Option<Value> {
        debug!("Handling JSON-RPC request: {:?}", request);

        // Batches are not supported and anything else is not a request object
        if !request.is_object() {
            warn!("Rejecting non-object JSON-RPC message");
            return Some(json!({
                "jsonrpc": "2.0",
                "error": ConnectorError::InvalidRequest.to_jsonrpc_error(),
                "id": null,
            }));
        }

        let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
        let id = match request.get("id") {
            Some(id) => id.clone(),
            None => {
                debug!(method, "Received notification");
                return None;
            }
        };
        let params = match request.get("params") {
            Some(Value::Null) | None => json!({}),
            Some(params) => params.clone(),
        };

        let result = match method {
            "initialize" => match serde_json::from_value::<InitializeRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_initialize(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::InvalidParams(e.to_string()).to_jsonrpc_error()),
            },
            "ping" => Ok(json!({})),
            "tools/list" => match serde_json::from_value::<Option<PaginatedRequestParam>>(params) {
                Ok(req) => self
                    .server
                    .handle_list_tools(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::InvalidParams(e.to_string()).to_jsonrpc_error()),
            },
            "tools/call" => match serde_json::from_value::<CallToolRequestParam>(params) {
                Ok(req) => self
                    .server
                    .handle_call_tool(req)
                    .await
                    .and_then(|r| serde_json::to_value(r).map_err(ConnectorError::SerdeJson))
                    .map_err(|e| e.to_jsonrpc_error()),
                Err(e) => Err(ConnectorError::InvalidParams(e.to_string()).to_jsonrpc_error()),
            },
            _ => Err(ConnectorError::MethodNotFound.to_jsonrpc_error()),
        };

        Some(match result {
            Ok(result) => json!({
                "jsonrpc": "2.0",
                "result": result,
                "id": id,
            }),
            Err(error) => json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            }),
        })
    }
}
