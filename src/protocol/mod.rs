//! MCP protocol surface
//!
//! Version and capability metadata, JSON-RPC envelope helpers shared by the
//! server and the client, and the result payloads of the five supported
//! methods.

pub mod message;

pub use message::{
    InitializeParams, NotificationMessage, ParsedMessage, RawMessage, ResourceReadParams,
    ToolCallParams,
};

use {
    crate::registry::{ResourceDefinition, ToolDefinition},
    serde::{Deserialize, Serialize},
    serde_json::{json, Value},
};

/// Protocol version announced by `initialize`
pub const PROTOCOL_VERSION: &str = "2025-06-18";

/// Server identity and envelope construction
#[derive(Debug, Clone)]
pub struct McpProtocol {
    version: String,
    server_name: String,
    server_version: String,
}

impl McpProtocol {
    pub fn new(server_name: impl Into<String>) -> Self {
        Self {
            version: PROTOCOL_VERSION.to_string(),
            server_name: server_name.into(),
            server_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn server_version(&self) -> &str {
        &self.server_version
    }

    /// Fixed capability/version metadata
    pub fn create_initialize_response(&self) -> Value {
        json!({
            "protocolVersion": self.version,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false }
            },
            "serverInfo": {
                "name": self.server_name,
                "version": self.server_version
            }
        })
    }

    pub fn create_error_response(&self, id: Value, code: i32, message: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {
                "code": code,
                "message": message
            }
        })
    }

    pub fn create_success_response(&self, id: Value, result: Value) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": result
        })
    }
}

/// Outbound request frame
pub fn request_frame(id: &str, method: &str, params: Option<Value>) -> Value {
    let mut frame = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
    });
    if let Some(params) = params {
        frame["params"] = params;
    }
    frame
}

/// Outbound notification frame (no id, never answered)
pub fn notification_frame(method: &str, params: Option<Value>) -> Value {
    let mut frame = json!({
        "jsonrpc": "2.0",
        "method": method,
    });
    if let Some(params) = params {
        frame["params"] = params;
    }
    frame
}

/// Result of `initialize`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeResult {
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    pub server_info: ServerInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListToolsResult {
    pub tools: Vec<ToolDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResourcesResult {
    pub resources: Vec<ResourceDefinition>,
}

/// One content item of a tool result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Content {
    Text { text: String },
}

impl Content {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> &str {
        match self {
            Self::Text { text } => text,
        }
    }
}

/// Result of `tools/call`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    pub content: Vec<Content>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl CallToolResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            is_error: false,
        }
    }

    /// Tool-level failure, still delivered as a successful response
    pub fn error(message: impl std::fmt::Display) -> Self {
        Self {
            content: vec![Content::text(format!("Error: {message}"))],
            is_error: true,
        }
    }

    /// Text of the first content item
    pub fn text(&self) -> Option<&str> {
        self.content.first().map(Content::as_text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContents {
    pub uri: String,
    pub mime_type: String,
    pub text: String,
}

/// Result of `resources/read`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}
