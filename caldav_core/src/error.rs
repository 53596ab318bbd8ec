// src/error.rs
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ConnectorError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Method not found")]
    MethodNotFound,

    #[error("Parse error")]
    ParseError,

    #[error("Invalid Request")]
    InvalidRequest,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("HTTP request error: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("{method} {url} returned {status}")]
    Upstream {
        method: String,
        url: String,
        status: u16,
    },

    #[error("XML error: {0}")]
    Xml(String),

    #[error("iCalendar error: {0}")]
    Calendar(String),

    #[error("AppleScript error: {0}")]
    AppleScript(String),

    #[error("{operation}: {source}")]
    Operation {
        operation: &'static str,
        #[source]
        source: Box<ConnectorError>,
    },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<quick_xml::Error> for ConnectorError {
    fn from(err: quick_xml::Error) -> Self {
        ConnectorError::Xml(err.to_string())
    }
}

impl ConnectorError {
    /// Prefix this error with the name of the operation that failed.
    pub fn context(self, operation: &'static str) -> Self {
        ConnectorError::Operation {
            operation,
            source: Box::new(self),
        }
    }

    /// Errors the protocol layer reports as JSON-RPC errors instead of tool results.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            ConnectorError::InvalidParams(_)
                | ConnectorError::ToolNotFound(_)
                | ConnectorError::MethodNotFound
                | ConnectorError::ParseError
                | ConnectorError::InvalidRequest
        )
    }

    pub fn code_str(&self) -> &'static str {
        match self {
            ConnectorError::InvalidParams(_) => "invalid_params",
            ConnectorError::Authentication(_) => "auth_failed",
            ConnectorError::NotFound(_) => "not_found",
            ConnectorError::ToolNotFound(_) => "tool_not_found",
            ConnectorError::MethodNotFound => "method_not_found",
            ConnectorError::ParseError => "parse_error",
            ConnectorError::InvalidRequest => "invalid_request",
            ConnectorError::Config(_) => "config_error",
            ConnectorError::Unavailable(_) => "unavailable",
            ConnectorError::HttpRequest(_) | ConnectorError::Upstream { .. } => "upstream_error",
            ConnectorError::Operation { source, .. } => source.code_str(),
            _ => "internal_error",
        }
    }

    pub fn to_jsonrpc_error(&self) -> serde_json::Value {
        let (code, message) = match self {
            ConnectorError::ToolNotFound(_) => (-32602, self.to_string()),
            ConnectorError::InvalidParams(msg) => (-32602, msg.to_string()),
            ConnectorError::MethodNotFound => (-32601, "Method not found".to_string()),
            ConnectorError::ParseError => (-32700, "Parse error".to_string()),
            ConnectorError::InvalidRequest => (-32600, "Invalid Request".to_string()),
            err => (-32603, err.to_string()),
        };

        json!({
            "code": code,
            "message": message,
            "data": { "kind": self.code_str() },
        })
    }
}
