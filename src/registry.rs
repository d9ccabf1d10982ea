//! Tool/resource registry recovered from generated server source
//!
//! A `Registry` is built once per source text and never mutated afterwards;
//! it is shared behind an `Arc` by every concurrent tool call.

use {
    serde::{Deserialize, Serialize},
    serde_json::{json, Value},
    std::{collections::HashMap, fmt},
};

pub const DEFAULT_SERVER_NAME: &str = "generated-mcp-server";
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
pub const DEFAULT_MIME_TYPE: &str = "application/json";

/// Tool definition as returned by `tools/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    /// Property names declared by the input schema
    pub fn property_names(&self) -> Vec<&str> {
        self.input_schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default()
    }
}

/// Resource definition as returned by `resources/list`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub uri: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_mime_type")]
    pub mime_type: String,
}

/// `{type: object, properties: {}}`, the schema used whenever none can be recovered
pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

fn default_mime_type() -> String {
    DEFAULT_MIME_TYPE.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Parse a verb case-insensitively
    pub fn parse(verb: &str) -> Option<Self> {
        match verb.to_ascii_uppercase().as_str() {
            "GET" => Some(Self::Get),
            "POST" => Some(Self::Post),
            "PUT" => Some(Self::Put),
            "PATCH" => Some(Self::Patch),
            "DELETE" => Some(Self::Delete),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Methods that may carry a request body
    pub fn allows_body(&self) -> bool {
        matches!(self, Self::Post | Self::Put | Self::Patch)
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binding of a `{placeholder}` in a path to a tool argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathParam {
    pub placeholder: String,
    pub argument_name: String,
}

impl PathParam {
    pub fn new(placeholder: impl Into<String>, argument_name: impl Into<String>) -> Self {
        Self {
            placeholder: placeholder.into(),
            argument_name: argument_name.into(),
        }
    }
}

/// Where a call template came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemplateOrigin {
    /// Recovered from the call-handling section of the source
    Parsed,
    /// Synthesized from the tool name
    Inferred,
}

/// How to turn one tool call into one HTTP request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallTemplate {
    pub method: HttpMethod,
    pub path: String,
    pub path_params: Vec<PathParam>,
    pub has_query_params: bool,
    pub has_body: bool,
    pub origin: TemplateOrigin,
}

impl CallTemplate {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: Vec::new(),
            has_query_params: false,
            has_body: false,
            origin: TemplateOrigin::Parsed,
        }
    }

    pub fn with_path_param(mut self, placeholder: &str, argument_name: &str) -> Self {
        self.path_params.push(PathParam::new(placeholder, argument_name));
        self
    }

    pub fn with_query_params(mut self) -> Self {
        self.has_query_params = true;
        self
    }

    pub fn with_body(mut self) -> Self {
        self.has_body = true;
        self
    }

    pub fn inferred(mut self) -> Self {
        self.origin = TemplateOrigin::Inferred;
        self
    }

    /// Whether an argument is consumed by the path
    pub fn binds_argument(&self, argument: &str) -> bool {
        self.path_params.iter().any(|p| p.argument_name == argument)
    }
}

/// Immutable snapshot of everything the generated server declares
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registry {
    server_name: String,
    api_base_url: String,
    tools: Vec<ToolDefinition>,
    resources: Vec<ResourceDefinition>,
    templates: HashMap<String, CallTemplate>,
    #[serde(skip)]
    tool_index: HashMap<String, usize>,
    #[serde(skip)]
    resource_index: HashMap<String, usize>,
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// An empty registry; the server still answers, with empty lists
    pub fn empty() -> Self {
        RegistryBuilder::default().build()
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn api_base_url(&self) -> &str {
        &self.api_base_url
    }

    /// Replace the API base URL found in the source with one supplied by the caller
    pub fn with_api_base_url(mut self, api_base_url: impl Into<String>) -> Self {
        self.api_base_url = api_base_url.into();
        self
    }

    /// Tools in declaration order
    pub fn tools(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Resources in declaration order
    pub fn resources(&self) -> &[ResourceDefinition] {
        &self.resources
    }

    pub fn tool(&self, name: &str) -> Option<&ToolDefinition> {
        self.tool_index.get(name).map(|&i| &self.tools[i])
    }

    pub fn resource(&self, uri: &str) -> Option<&ResourceDefinition> {
        self.resource_index.get(uri).map(|&i| &self.resources[i])
    }

    pub fn template(&self, name: &str) -> Option<&CallTemplate> {
        self.templates.get(name)
    }

    pub fn templates(&self) -> &HashMap<String, CallTemplate> {
        &self.templates
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::empty()
    }
}

/// Accumulates definitions; `build` fills in missing call templates.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    server_name: Option<String>,
    api_base_url: Option<String>,
    tools: Vec<ToolDefinition>,
    resources: Vec<ResourceDefinition>,
    templates: HashMap<String, CallTemplate>,
}

impl RegistryBuilder {
    pub fn server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = Some(name.into());
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    /// Add a tool; a later tool with the same name replaces the earlier one in place.
    pub fn tool(mut self, tool: ToolDefinition) -> Self {
        match self.tools.iter_mut().find(|t| t.name == tool.name) {
            Some(existing) => *existing = tool,
            None => self.tools.push(tool),
        }
        self
    }

    /// Add a resource; last definition of a uri wins.
    pub fn resource(mut self, resource: ResourceDefinition) -> Self {
        match self.resources.iter_mut().find(|r| r.uri == resource.uri) {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
        self
    }

    pub fn template(mut self, tool_name: impl Into<String>, template: CallTemplate) -> Self {
        self.templates.insert(tool_name.into(), template);
        self
    }

    pub fn build(mut self) -> Registry {
        for tool in &self.tools {
            if !self.templates.contains_key(&tool.name) {
                let template = crate::introspect::infer::infer_template(tool);
                self.templates.insert(tool.name.clone(), template);
            }
        }

        let tool_index = self
            .tools
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.clone(), i))
            .collect();
        let resource_index = self
            .resources
            .iter()
            .enumerate()
            .map(|(i, r)| (r.uri.clone(), i))
            .collect();

        Registry {
            server_name: self
                .server_name
                .unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()),
            api_base_url: self
                .api_base_url
                .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
            tools: self.tools,
            resources: self.resources,
            templates: self.templates,
            tool_index,
            resource_index,
        }
    }
}
