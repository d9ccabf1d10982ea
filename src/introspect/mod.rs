//! Source Introspection
//!
//! Recovers a [`Registry`] from generated MCP server source (Python or
//! TypeScript) by structural pattern matching. Parsing never fails: anything
//! that cannot be recognized is skipped or replaced with a safe default, and
//! every tool ends up with a call template (parsed or inferred).

pub mod infer;
pub mod scan;
pub mod schema;
pub mod templates;

use {
    crate::registry::{
        Registry, ResourceDefinition, ToolDefinition, DEFAULT_API_BASE_URL, DEFAULT_MIME_TYPE,
        DEFAULT_SERVER_NAME,
    },
    once_cell::sync::Lazy,
    regex::Regex,
    scan::KeyedLiteral,
    serde::Serialize,
    serde_json::Value,
    tracing::{debug, info},
};

/// Dialect of the generated server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    Python,
    TypeScript,
    Unknown,
}

impl SourceLanguage {
    pub fn detect(source: &str) -> Self {
        static PYTHON: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"(?m)^\s*(?:async\s+def|def|from\s+\S+\s+import|import\s+\w+$)")
                .expect("python marker regex must compile")
        });
        static TYPESCRIPT: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r#"(?m)^\s*(?:import\s*\{|import\s+\w+\s+from|const\s|export\s)|=>"#)
                .expect("typescript marker regex must compile")
        });
        let python = PYTHON.find_iter(source).count();
        let typescript = TYPESCRIPT.find_iter(source).count();
        match (python, typescript) {
            (0, 0) => Self::Unknown,
            (p, t) if p >= t => Self::Python,
            _ => Self::TypeScript,
        }
    }
}

static SERVER_NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#"\b(?:Server|FastMCP)\s*\(\s*(?:name\s*=\s*)?["']([^"'\n]+)["']"#,
        r#"(?s)new\s+(?:Mcp)?Server\s*\(\s*\{.*?\bname\s*:\s*["'`]([^"'`\n]+)["'`]"#,
        r#"\bSERVER_NAME\s*(?::\s*\w+\s*)?=\s*["'`]([^"'`\n]+)["'`]"#,
    ]
    .iter()
    .map(|p| Regex::new(p).expect("server name regex must compile"))
    .collect()
});

static API_BASE_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\b(?:API_BASE_URL|BASE_URL|API_URL|baseURL|apiBaseUrl)\b[^\n]*?[=:][^\n]*?["'`](https?://[^"'`\s]+)["'`]"#,
    )
    .expect("api base url regex must compile")
});

static TOOLS_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"setRequestHandler\s*\(\s*ListToolsRequestSchema|@\w+\.list_tools\s*\(|def\s+\w*list_tools\w*\s*\(")
        .expect("tools section regex must compile")
});

static RESOURCES_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"setRequestHandler\s*\(\s*ListResourcesRequestSchema|@\w+\.list_resources\s*\(|def\s+\w*list_resources\w*\s*\(")
        .expect("resources section regex must compile")
});

static CALLS_SECTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"setRequestHandler\s*\(\s*CallToolRequestSchema|@\w+\.call_tool\s*\(|def\s+\w*call_tool\w*\s*\(")
        .expect("calls section regex must compile")
});

static NAME_KEY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["']?\bname\b["']?\s*[:=]"#).expect("name key regex must compile"));

static DESCRIPTION_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?\bdescription\b["']?\s*[:=]"#).expect("description key regex must compile")
});

static SCHEMA_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?\b(?:inputSchema|input_schema)\b["']?\s*[:=]"#)
        .expect("schema key regex must compile")
});

static URI_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?\buri\b["']?\s*[:=]\s*(?:AnyUrl\s*\(\s*)?"#).expect("uri key regex must compile")
});

static MIME_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["']?\b(?:mimeType|mime_type)\b["']?\s*[:=]"#).expect("mime key regex must compile")
});

/// Entry point of the introspection passes
pub struct SourceIntrospector;

impl SourceIntrospector {
    /// Recover the registry declared by `source`. Never fails.
    pub fn parse(source: &str) -> Registry {
        let language = SourceLanguage::detect(source);
        let server_name = extract_server_name(source);
        let api_base_url = extract_api_base_url(source);
        debug!(
            ?language,
            server_name = server_name.as_deref(),
            api_base_url = api_base_url.as_deref(),
            "Introspecting generated server source"
        );

        let mut builder = Registry::builder()
            .server_name(server_name.unwrap_or_else(|| DEFAULT_SERVER_NAME.to_string()))
            .api_base_url(api_base_url.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()));

        for tool in extract_tools(source) {
            builder = builder.tool(tool);
        }
        for resource in extract_resources(source) {
            builder = builder.resource(resource);
        }

        let calls = scan::section(source, &CALLS_SECTION).unwrap_or(source);
        let mut parsed_templates = 0;
        for (name, template) in templates::extract_templates(calls) {
            parsed_templates += 1;
            builder = builder.template(name, template);
        }

        let registry = builder.build();
        info!(
            event = "source_introspected",
            ?language,
            server_name = registry.server_name(),
            tools = registry.tools().len(),
            resources = registry.resources().len(),
            parsed_templates,
            "Recovered registry from generated source"
        );
        registry
    }
}

/// Server name declared by the source
pub fn extract_server_name(source: &str) -> Option<String> {
    SERVER_NAME_PATTERNS
        .iter()
        .find_map(|re| re.captures(source))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}

/// API base URL literal declared by the source, without trailing slash
pub fn extract_api_base_url(source: &str) -> Option<String> {
    API_BASE_URL
        .captures(source)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('/').to_string())
}

/// Tools from the listing handler, or from anywhere a full tool entry appears.
pub fn extract_tools(source: &str) -> Vec<ToolDefinition> {
    if let Some(section) = scan::section(source, &TOOLS_SECTION) {
        let tools = scan_tool_entries(section, false);
        if !tools.is_empty() {
            return tools;
        }
    }
    // Tool lists hoisted into a constant: only trust entries with a schema
    scan_tool_entries(source, true)
}

/// Resources from the listing handler (or the whole source when there is none)
pub fn extract_resources(source: &str) -> Vec<ResourceDefinition> {
    let text = scan::section(source, &RESOURCES_SECTION).unwrap_or(source);
    let mut brackets = scan::OpenBrackets::new();
    let mut resources = Vec::new();
    let mut cursor = 0;

    while let Some(uri) = scan::find_keyed_literal(text, &URI_KEY, cursor, text.len()) {
        cursor = uri.end;
        if !uri.value.contains("://") {
            continue;
        }
        let next = scan::find_keyed_literal(text, &URI_KEY, uri.end, text.len())
            .map_or(text.len(), |next| next.start);
        let (lo, hi) = entry_bounds(text, &mut brackets, uri.start, next).unwrap_or((uri.end, next));
        let skip = [(uri.start, uri.end)];
        let field = |key: &Regex| find_outside(text, key, lo, hi, &skip).map(|l| l.value);

        resources.push(ResourceDefinition {
            name: field(&NAME_KEY).unwrap_or_else(|| uri.value.clone()),
            description: field(&DESCRIPTION_KEY).unwrap_or_default(),
            mime_type: field(&MIME_KEY).unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
            uri: uri.value,
        });
    }
    resources
}

/// Schema block of a tool entry: `(key start, block end, value)`
struct SchemaSpan {
    start: usize,
    end: usize,
    value: Value,
}

fn scan_tool_entries(text: &str, require_schema: bool) -> Vec<ToolDefinition> {
    let mut brackets = scan::OpenBrackets::new();
    let mut tools = Vec::new();
    let mut cursor = 0;

    while let Some(name) = scan::find_keyed_literal(text, &NAME_KEY, cursor, text.len()) {
        let next = next_name_start(text, name.end);
        let (lo, hi) = entry_bounds(text, &mut brackets, name.start, next).unwrap_or((name.end, next));
        let schema = find_schema(text, lo, hi);

        let mut skip = vec![(name.start, name.end)];
        if let Some(span) = &schema {
            skip.push((span.start, span.end));
            skip.sort_unstable();
        }
        let description = find_outside(text, &DESCRIPTION_KEY, lo, hi, &skip)
            .map(|l| l.value)
            .unwrap_or_default();

        cursor = schema.as_ref().map_or(name.end, |span| span.end.max(name.end));

        if !scan::is_identifier_safe(&name.value) {
            debug!(name = %name.value, "Skipping tool with unsafe name");
            continue;
        }
        if require_schema && schema.is_none() {
            continue;
        }

        tools.push(ToolDefinition {
            name: name.value,
            description,
            input_schema: schema
                .map(|span| span.value)
                .unwrap_or_else(crate::registry::empty_object_schema),
        });
    }
    tools
}

/// Inside of the bracketed entry holding the key at `key_start`.
///
/// `None` unless the entry closes before the next entry's key, so a list
/// that is not split into per-entry brackets falls back to key order.
fn entry_bounds(
    text: &str,
    brackets: &mut scan::OpenBrackets,
    key_start: usize,
    next_key: usize,
) -> Option<(usize, usize)> {
    let open = brackets.innermost_at(text, key_start)?;
    let close = open + scan::balanced_block(text, open)?.len() - 1;
    (close <= next_key).then_some((open + 1, close))
}

/// First `key` literal in `[from, to)` outside the sorted `skip` spans
fn find_outside(
    text: &str,
    key: &Regex,
    from: usize,
    to: usize,
    skip: &[(usize, usize)],
) -> Option<KeyedLiteral> {
    let mut start = from;
    for &(skip_start, skip_end) in skip.iter().chain(std::iter::once(&(to, to))) {
        let end = skip_start.min(to);
        if start < end {
            if let Some(found) = scan::find_keyed_literal(text, key, start, end) {
                return Some(found);
            }
        }
        start = start.max(skip_end);
    }
    None
}

fn next_name_start(text: &str, from: usize) -> usize {
    scan::find_keyed_literal(text, &NAME_KEY, from, text.len())
        .map_or(text.len(), |KeyedLiteral { start, .. }| start)
}

fn find_schema(text: &str, from: usize, to: usize) -> Option<SchemaSpan> {
    let key = SCHEMA_KEY.find_at(text, from).filter(|m| m.start() < to)?;
    let open = scan::skip_ws(text, key.end());
    let Some(block) = scan::balanced_block(text, open) else {
        // Schema built by a call or variable; keep the entry with the default schema
        return Some(SchemaSpan {
            start: key.start(),
            end: key.end(),
            value: crate::registry::empty_object_schema(),
        });
    };
    Some(SchemaSpan {
        start: key.start(),
        end: open + block.len(),
        value: schema::normalize_schema(block),
    })
}
