//! JSON-RPC message parsing
//!
//! Inbound bytes are parsed once into a borrowed [`RawMessage`]; parameters
//! stay as raw JSON until the method is known and are then deserialized
//! straight into the typed params of a [`ParsedMessage`].

use {
    crate::error::{McpError, McpResult},
    serde::{Deserialize, Serialize},
    serde_json::{error::Category, value::RawValue, Value},
    std::borrow::Cow,
};

/// Envelope of an inbound JSON-RPC message with lazily parsed params
#[derive(Debug, Deserialize)]
pub struct RawMessage<'a> {
    #[serde(borrow, default)]
    pub jsonrpc: Option<Cow<'a, str>>,
    /// Absent (or null) for notifications
    #[serde(borrow, default)]
    pub id: Option<&'a RawValue>,
    #[serde(borrow, default)]
    pub method: Option<Cow<'a, str>>,
    #[serde(borrow, default)]
    pub params: Option<&'a RawValue>,
}

/// A validated request or notification with typed parameters
#[derive(Debug)]
pub enum ParsedMessage {
    Initialize(InitializeParams),
    ToolsList,
    ToolsCall(ToolCallParams),
    ResourcesList,
    ResourcesRead(ResourceReadParams),
    Notification(NotificationMessage),
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    #[serde(default)]
    pub protocol_version: String,
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub client_info: Option<Value>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ResourceReadParams {
    pub uri: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct NotificationMessage {
    pub method: String,
    pub params: Option<Value>,
}

impl<'a> RawMessage<'a> {
    /// Parse the envelope. Malformed JSON is a parse error; well-formed JSON
    /// of the wrong shape (arrays, scalars) is an invalid request.
    pub fn from_slice(bytes: &'a [u8]) -> McpResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| match e.classify() {
            Category::Data => McpError::InvalidRequest(e.to_string()),
            _ => McpError::Parse(e.to_string()),
        })
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    /// Request id for the response envelope
    pub fn id_value(&self) -> Option<Value> {
        self.id.and_then(|raw| serde_json::from_str(raw.get()).ok())
    }

    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    pub fn validate(&self) -> McpResult<()> {
        match self.jsonrpc.as_deref() {
            Some("2.0") => {}
            Some(other) => {
                return Err(McpError::InvalidRequest(format!("Invalid jsonrpc version: {other}")))
            }
            None => return Err(McpError::InvalidRequest("Missing 'jsonrpc' field".into())),
        }
        match self.method() {
            Some(method) if !method.is_empty() => Ok(()),
            _ => Err(McpError::InvalidRequest("Missing or empty 'method' field".into())),
        }
    }

    /// Deserialize params according to the method name
    pub fn parse_params(&self) -> McpResult<ParsedMessage> {
        self.validate()?;
        let method = self.method().unwrap_or_default();

        match method {
            "initialize" => Ok(ParsedMessage::Initialize(self.required_params(method)?)),
            "tools/list" => Ok(ParsedMessage::ToolsList),
            "tools/call" => Ok(ParsedMessage::ToolsCall(self.required_params(method)?)),
            "resources/list" => Ok(ParsedMessage::ResourcesList),
            "resources/read" => Ok(ParsedMessage::ResourcesRead(self.required_params(method)?)),
            method if method.starts_with("notifications/") => {
                Ok(ParsedMessage::Notification(NotificationMessage {
                    method: method.to_string(),
                    params: self
                        .params
                        .map(|p| serde_json::from_str(p.get()).unwrap_or(Value::Null)),
                }))
            }
            _ => Err(McpError::UnknownMethod(method.to_string())),
        }
    }

    fn required_params<T: serde::de::DeserializeOwned>(&self, method: &str) -> McpResult<T> {
        let params = self
            .params
            .ok_or_else(|| McpError::InvalidParams(format!("Missing params for {method}")))?;
        serde_json::from_str(params.get())
            .map_err(|e| McpError::InvalidParams(format!("Invalid {method} params: {e}")))
    }
}
