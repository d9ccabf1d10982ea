//! Protocol server emulating a generated MCP server
//!
//! Answers `initialize`, `tools/list`, `tools/call`, `resources/list` and
//! `resources/read` from a [`Registry`], executing tool calls and resource
//! reads through a [`Dispatch`] implementation.

use {
    crate::{
        dispatch::Dispatch,
        error::{McpError, McpResult},
        logging,
        protocol::{
            CallToolResult, ListResourcesResult, ListToolsResult, McpProtocol, ParsedMessage,
            RawMessage, ReadResourceResult, ResourceContents, ResourceReadParams, ToolCallParams,
        },
        registry::{CallTemplate, HttpMethod, Registry},
    },
    serde_json::Value,
    std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        time::Instant,
    },
    tokio::sync::RwLock,
    tracing::{debug, info, Instrument},
    url::Url,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for `initialize`
    Initializing,
    Ready,
}

pub struct ProtocolServer {
    registry: Arc<Registry>,
    dispatcher: Arc<dyn Dispatch>,
    protocol: McpProtocol,
    initialized: AtomicBool,
    client_info: RwLock<Option<Value>>,
}

impl ProtocolServer {
    pub fn new(registry: Arc<Registry>, dispatcher: Arc<dyn Dispatch>) -> Self {
        Self {
            protocol: McpProtocol::new(registry.server_name()),
            registry,
            dispatcher,
            initialized: AtomicBool::new(false),
            client_info: RwLock::new(None),
        }
    }

    pub fn state(&self) -> ServerState {
        if self.initialized.load(Ordering::Acquire) {
            ServerState::Ready
        } else {
            ServerState::Initializing
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub async fn client_info(&self) -> Option<Value> {
        self.client_info.read().await.clone()
    }

    pub async fn handle_message(&self, message: &Value) -> Option<Value> {
        match serde_json::to_vec(message) {
            Ok(bytes) => self.handle_bytes(&bytes).await,
            Err(e) => Some(McpError::from(e).to_json_rpc_error(None)),
        }
    }

    /// Handle one inbound frame. Returns the response envelope, or `None` for
    /// notifications.
    pub async fn handle_bytes(&self, bytes: &[u8]) -> Option<Value> {
        let raw = match RawMessage::from_slice(bytes) {
            Ok(raw) => raw,
            Err(e) => {
                logging::log_parse_error(&e.to_string(), &String::from_utf8_lossy(bytes));
                return Some(e.to_json_rpc_error(None));
            }
        };
        let id = raw.id_value();
        let is_notification = raw.is_notification();
        let method = raw.method().unwrap_or_default().to_string();
        let parsed = raw.parse_params();

        let started = Instant::now();
        let span = logging::request_span(&method, id.as_ref());
        let result = match parsed {
            Ok(parsed) => self.handle_parsed(parsed).instrument(span).await,
            Err(e) => Err(e),
        };

        match &result {
            Ok(_) => logging::log_handler_success(&method, started.elapsed()),
            Err(e) => logging::log_handler_error(&method, &e.to_string(), started.elapsed()),
        }
        if is_notification {
            return None;
        }

        let id = id.unwrap_or(Value::Null);
        Some(match result {
            Ok(value) => self.protocol.create_success_response(id, value),
            Err(e) => e.to_json_rpc_error(Some(id)),
        })
    }

    async fn handle_parsed(&self, message: ParsedMessage) -> McpResult<Value> {
        match message {
            ParsedMessage::Initialize(params) => {
                info!(
                    client_version = %params.protocol_version,
                    server_version = self.protocol.version(),
                    "Client initializing"
                );
                *self.client_info.write().await = params.client_info;
                self.initialized.store(true, Ordering::Release);
                Ok(self.protocol.create_initialize_response())
            }
            ParsedMessage::Notification(notification) => {
                debug!(method = %notification.method, "Notification received");
                Ok(Value::Null)
            }
            _ if self.state() != ServerState::Ready => Err(McpError::NotInitialized),
            ParsedMessage::ToolsList => Ok(serde_json::to_value(ListToolsResult {
                tools: self.registry.tools().to_vec(),
            })?),
            ParsedMessage::ResourcesList => Ok(serde_json::to_value(ListResourcesResult {
                resources: self.registry.resources().to_vec(),
            })?),
            ParsedMessage::ToolsCall(params) => Ok(serde_json::to_value(self.call_tool(params).await)?),
            ParsedMessage::ResourcesRead(params) => {
                Ok(serde_json::to_value(self.read_resource(params).await?)?)
            }
        }
    }

    /// Tool failures become error text content, never protocol errors.
    pub async fn call_tool(&self, params: ToolCallParams) -> CallToolResult {
        logging::log_tool_call(&params.name, &params.arguments);

        // Only tools advertised by tools/list are callable
        let template = self
            .registry
            .tool(&params.name)
            .and_then(|tool| self.registry.template(&tool.name));
        let Some(template) = template else {
            logging::log_unknown_tool(&params.name);
            return CallToolResult::error(format!("Tool not found: {}", params.name));
        };

        match self
            .dispatcher
            .execute(template, self.registry.api_base_url(), &params.arguments)
            .await
        {
            Ok(response) => CallToolResult::success(body_text(&response.body)),
            Err(e) => CallToolResult::error(e),
        }
    }

    pub async fn read_resource(&self, params: ResourceReadParams) -> McpResult<ReadResourceResult> {
        let resource = self
            .registry
            .resource(&params.uri)
            .ok_or_else(|| McpError::UnknownResource(params.uri.clone()))?;

        let template = CallTemplate::new(HttpMethod::Get, resource_read_path(&resource.uri));
        let response = self
            .dispatcher
            .execute(&template, self.registry.api_base_url(), &Value::Null)
            .await?;

        Ok(ReadResourceResult {
            contents: vec![ResourceContents {
                uri: resource.uri.clone(),
                mime_type: resource.mime_type.clone(),
                text: body_text(&response.body),
            }],
        })
    }
}

/// Canonical GET path for a resource uri.
///
/// `posts://all` and `posts://` read `/posts`, `posts://123` reads
/// `/posts/123`, and `http(s)` uris read their own path.
pub fn resource_read_path(uri: &str) -> String {
    if let Ok(url) = Url::parse(uri) {
        if matches!(url.scheme(), "http" | "https") {
            return match url.query() {
                Some(query) => format!("{}?{query}", url.path()),
                None => url.path().to_string(),
            };
        }
    }

    let Some((scheme, rest)) = uri.split_once("://") else {
        return format!("/{}", uri.trim_matches('/'));
    };
    let rest = rest.trim_matches('/');
    match rest {
        "" | "all" | "list" => format!("/{scheme}"),
        _ => format!("/{scheme}/{rest}"),
    }
}

/// Strings are passed through, anything else is pretty-printed JSON
fn body_text(body: &Value) -> String {
    match body {
        Value::String(text) => text.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        dispatch::DispatchResponse,
        error::{codes, DispatchError, DispatchResult},
        registry::{ResourceDefinition, ToolDefinition, empty_object_schema},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records every call and answers with a canned outcome
    #[derive(Default)]
    struct RecordingDispatch {
        calls: Mutex<Vec<(CallTemplate, String, Value)>>,
        fail: bool,
    }

    #[async_trait]
    impl Dispatch for RecordingDispatch {
        async fn execute(
            &self,
            template: &CallTemplate,
            api_base_url: &str,
            args: &Value,
        ) -> DispatchResult<DispatchResponse> {
            self.calls
                .lock()
                .unwrap()
                .push((template.clone(), api_base_url.to_string(), args.clone()));
            if self.fail {
                return Err(DispatchError::Status {
                    status: 404,
                    reason: "Not Found".into(),
                    body: "{}".into(),
                });
            }
            Ok(DispatchResponse {
                status: 200,
                body: json!({"id": 7, "title": "hello"}),
            })
        }
    }

    fn registry() -> Arc<Registry> {
        Arc::new(
            Registry::builder()
                .server_name("jsonplaceholder-api")
                .api_base_url("https://api.test")
                .tool(ToolDefinition {
                    name: "get_posts".into(),
                    description: "All posts".into(),
                    input_schema: empty_object_schema(),
                })
                .tool(ToolDefinition {
                    name: "get_post_by_id".into(),
                    description: "One post".into(),
                    input_schema: json!({"type": "object", "properties": {"id": {"type": "string"}}}),
                })
                .template(
                    "get_post_by_id",
                    CallTemplate::new(HttpMethod::Get, "/posts/{id}").with_path_param("id", "id"),
                )
                .template("purge_posts", CallTemplate::new(HttpMethod::Delete, "/posts"))
                .resource(ResourceDefinition {
                    uri: "posts://all".into(),
                    name: "All posts".into(),
                    description: String::new(),
                    mime_type: "application/json".into(),
                })
                .build(),
        )
    }

    fn server(fail: bool) -> (ProtocolServer, Arc<RecordingDispatch>) {
        let dispatch = Arc::new(RecordingDispatch {
            fail,
            ..Default::default()
        });
        (ProtocolServer::new(registry(), dispatch.clone()), dispatch)
    }

    async fn initialized(fail: bool) -> (ProtocolServer, Arc<RecordingDispatch>) {
        let (server, dispatch) = server(fail);
        let response = server
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 0, "method": "initialize",
                "params": {"protocolVersion": "2025-06-18", "capabilities": {}, "clientInfo": {"name": "t"}}
            }))
            .await
            .unwrap();
        assert_eq!(response["result"]["serverInfo"]["name"], "jsonplaceholder-api");
        assert_eq!(server.state(), ServerState::Ready);
        (server, dispatch)
    }

    #[tokio::test]
    async fn requests_before_initialize_are_rejected() {
        let (server, _) = server(false);
        assert_eq!(server.state(), ServerState::Initializing);
        let response = server
            .handle_message(&json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
            .await
            .unwrap();
        assert_eq!(response["error"]["code"], codes::NOT_INITIALIZED);
        assert_eq!(response["id"], 1);
    }

    #[tokio::test]
    async fn tools_list_returns_registry_in_order() {
        let (server, _) = initialized(false).await;
        let response = server
            .handle_message(&json!({"jsonrpc": "2.0", "id": "x", "method": "tools/list"}))
            .await
            .unwrap();
        let names: Vec<&str> = response["result"]["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, ["get_posts", "get_post_by_id"]);
        assert_eq!(response["id"], "x");
    }

    #[tokio::test]
    async fn tools_call_wraps_body_as_text() {
        let (server, dispatch) = initialized(false).await;
        let response = server
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "get_post_by_id", "arguments": {"id": "7"}}
            }))
            .await
            .unwrap();
        let result: CallToolResult = serde_json::from_value(response["result"].clone()).unwrap();
        assert!(!result.is_error);
        let body: Value = serde_json::from_str(result.text().unwrap()).unwrap();
        assert_eq!(body["title"], "hello");

        let calls = dispatch.calls.lock().unwrap();
        assert_eq!(calls[0].0.path, "/posts/{id}");
        assert_eq!(calls[0].1, "https://api.test");
        assert_eq!(calls[0].2, json!({"id": "7"}));
    }

    #[tokio::test]
    async fn tool_errors_are_successful_responses() {
        let (server, _) = initialized(true).await;
        let response = server
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "get_posts", "arguments": {}}
            }))
            .await
            .unwrap();
        assert!(response.get("error").is_none());
        assert_eq!(response["result"]["isError"], true);
        assert!(response["result"]["content"][0]["text"]
            .as_str()
            .unwrap()
            .starts_with("Error: API returned 404"));

        let missing = server
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 4, "method": "tools/call",
                "params": {"name": "nope"}
            }))
            .await
            .unwrap();
        assert_eq!(missing["result"]["content"][0]["text"], "Error: Tool not found: nope");
    }

    #[tokio::test]
    async fn resources_read_infers_path() {
        let (server, dispatch) = initialized(false).await;
        let response = server
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 5, "method": "resources/read",
                "params": {"uri": "posts://all"}
            }))
            .await
            .unwrap();
        assert_eq!(response["result"]["contents"][0]["uri"], "posts://all");
        assert_eq!(response["result"]["contents"][0]["mimeType"], "application/json");
        assert_eq!(dispatch.calls.lock().unwrap()[0].0.path, "/posts");
    }

    #[tokio::test]
    async fn unknown_resource_and_failed_read_are_protocol_errors() {
        let (server, _) = initialized(true).await;
        let unknown = server
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 6, "method": "resources/read",
                "params": {"uri": "users://all"}
            }))
            .await
            .unwrap();
        assert_eq!(unknown["error"]["code"], codes::INVALID_REQUEST);

        let failed = server
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 7, "method": "resources/read",
                "params": {"uri": "posts://all"}
            }))
            .await
            .unwrap();
        assert_eq!(failed["error"]["code"], codes::INTERNAL_ERROR);
    }

    #[tokio::test]
    async fn notifications_and_garbage() {
        let (server, _) = server(false);
        assert!(server
            .handle_message(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await
            .is_none());

        let parse = server.handle_bytes(b"{oops").await.unwrap();
        assert_eq!(parse["error"]["code"], codes::PARSE_ERROR);
        assert!(parse["id"].is_null());

        let (ready, _) = initialized(false).await;
        let unknown = ready
            .handle_message(&json!({"jsonrpc": "2.0", "id": 9, "method": "prompts/list"}))
            .await
            .unwrap();
        assert_eq!(unknown["error"]["code"], codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn read_path_conventions() {
        assert_eq!(resource_read_path("posts://all"), "/posts");
        assert_eq!(resource_read_path("posts://"), "/posts");
        assert_eq!(resource_read_path("posts://123"), "/posts/123");
        assert_eq!(resource_read_path("https://api.test/users?limit=5"), "/users?limit=5");
        assert_eq!(resource_read_path("todos"), "/todos");
    }

    #[tokio::test]
    async fn template_without_listed_tool_is_not_callable() {
        let (server, dispatch) = initialized(false).await;
        assert!(server.registry().template("purge_posts").is_some());

        let response = server
            .handle_message(&json!({
                "jsonrpc": "2.0", "id": 30, "method": "tools/call",
                "params": {"name": "purge_posts", "arguments": {}}
            }))
            .await
            .unwrap();

        assert_eq!(response["result"]["isError"], true);
        assert_eq!(response["result"]["content"][0]["text"], "Error: Tool not found: purge_posts");
        assert!(dispatch.calls.lock().unwrap().is_empty());
    }
}
