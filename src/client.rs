//! Typed client for a protocol server reached through a [`StreamMultiplexer`]

use {
    crate::{
        error::{ClientError, ClientResult},
        multiplexer::StreamMultiplexer,
        protocol::{
            CallToolResult, InitializeResult, ListResourcesResult, ListToolsResult,
            ReadResourceResult, PROTOCOL_VERSION,
        },
        registry::{ResourceDefinition, ToolDefinition},
    },
    serde::de::DeserializeOwned,
    serde_json::{json, Value},
    std::sync::Arc,
};

#[derive(Clone)]
pub struct McpClient {
    mux: Arc<StreamMultiplexer>,
}

impl McpClient {
    pub fn new(mux: StreamMultiplexer) -> Self {
        Self { mux: Arc::new(mux) }
    }

    pub fn multiplexer(&self) -> &StreamMultiplexer {
        &self.mux
    }

    /// Handshake, followed by `notifications/initialized`.
    pub async fn initialize(&self, client_name: &str) -> ClientResult<InitializeResult> {
        let params = json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_name,
                "version": env!("CARGO_PKG_VERSION")
            }
        });
        let result = self.request("initialize", Some(params)).await?;
        self.mux.notify("notifications/initialized", None).await?;
        Ok(result)
    }

    pub async fn list_tools(&self) -> ClientResult<Vec<ToolDefinition>> {
        let result: ListToolsResult = self.request("tools/list", None).await?;
        Ok(result.tools)
    }

    /// Tool failures come back as `Ok` with `is_error` set.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> ClientResult<CallToolResult> {
        self.request("tools/call", Some(json!({ "name": name, "arguments": arguments })))
            .await
    }

    pub async fn list_resources(&self) -> ClientResult<Vec<ResourceDefinition>> {
        let result: ListResourcesResult = self.request("resources/list", None).await?;
        Ok(result.resources)
    }

    pub async fn read_resource(&self, uri: &str) -> ClientResult<ReadResourceResult> {
        self.request("resources/read", Some(json!({ "uri": uri }))).await
    }

    pub async fn notify(&self, method: &str, params: Option<Value>) -> ClientResult<()> {
        self.mux.notify(method, params).await
    }

    /// Send any request and decode its result
    pub async fn request<T: DeserializeOwned>(&self, method: &str, params: Option<Value>) -> ClientResult<T> {
        let result = self.mux.send(method, params).await?;
        serde_json::from_value(result)
            .map_err(|e| ClientError::UnexpectedResult(format!("{method}: {e}")))
    }
}
