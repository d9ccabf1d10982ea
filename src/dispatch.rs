//! Outbound HTTP execution of call templates

use {
    crate::{
        config::DispatcherConfig,
        error::{DispatchError, DispatchResult},
        logging,
        registry::CallTemplate,
    },
    async_trait::async_trait,
    serde::Serialize,
    serde_json::{Map, Value},
    std::time::Instant,
    url::Url,
};

/// Normalized result of a successful (2xx) API call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchResponse {
    pub status: u16,
    /// Parsed JSON when the body is well-formed, otherwise the raw text
    pub body: Value,
}

/// Executes one call template against an API base URL.
///
/// The protocol server depends on this trait rather than on [`CallDispatcher`]
/// so tests can substitute a recording implementation.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn execute(
        &self,
        template: &CallTemplate,
        api_base_url: &str,
        args: &Value,
    ) -> DispatchResult<DispatchResponse>;
}

/// The pieces of a request derived from a template and its arguments
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParts {
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

/// `reqwest`-backed dispatcher. Holds no per-call state.
#[derive(Debug, Clone)]
pub struct CallDispatcher {
    client: reqwest::Client,
    config: DispatcherConfig,
}

impl CallDispatcher {
    pub fn new(config: DispatcherConfig) -> DispatchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DispatchError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }
}

#[async_trait]
impl Dispatch for CallDispatcher {
    async fn execute(
        &self,
        template: &CallTemplate,
        api_base_url: &str,
        args: &Value,
    ) -> DispatchResult<DispatchResponse> {
        let parts = build_request_parts(template, args)?;
        let url = build_url(api_base_url, &parts.path, &parts.query)?;
        let started = Instant::now();

        let mut request = self
            .client
            .request(template.method.to_reqwest(), url.clone())
            .header(reqwest::header::ACCEPT, "application/json");
        if let Some(body) = &parts.body {
            request = request.json(body);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                logging::log_dispatch(template.method.as_str(), url.as_str(), None, started.elapsed());
                return Err(e.into());
            }
        };
        let status = response.status();
        let bytes = read_body_limited(response, self.config.max_response_bytes).await?;
        logging::log_dispatch(
            template.method.as_str(),
            url.as_str(),
            Some(status.as_u16()),
            started.elapsed(),
        );

        let text = String::from_utf8_lossy(&bytes).into_owned();
        if !status.is_success() {
            return Err(DispatchError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: text,
            });
        }

        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        Ok(DispatchResponse {
            status: status.as_u16(),
            body,
        })
    }
}

/// Substitute path placeholders and split the remaining arguments into query
/// pairs and/or a JSON body according to the template.
pub fn build_request_parts(template: &CallTemplate, args: &Value) -> DispatchResult<RequestParts> {
    let empty = Map::new();
    let args = args.as_object().unwrap_or(&empty);

    let mut path = template.path.clone();
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    for param in &template.path_params {
        let value = match args.get(&param.argument_name) {
            Some(Value::Null) | None => {
                return Err(DispatchError::MissingPathArgument(param.argument_name.clone()))
            }
            Some(value) => value,
        };
        path = path.replace(
            &format!("{{{}}}", param.placeholder),
            &encode_component(&value_to_string(value)),
        );
    }

    let remaining: Map<String, Value> = args
        .iter()
        .filter(|(key, _)| !template.binds_argument(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    let mut query = Vec::new();
    if template.has_query_params {
        for (key, value) in &remaining {
            match value {
                Value::Null => {}
                Value::Array(items) => query.extend(
                    items
                        .iter()
                        .filter(|item| !item.is_null())
                        .map(|item| (key.clone(), value_to_string(item))),
                ),
                other => query.push((key.clone(), value_to_string(other))),
            }
        }
    }

    let body = (template.has_body && template.method.allows_body()).then(|| Value::Object(remaining));

    Ok(RequestParts { path, query, body })
}

/// `api_base_url + path`, with the query string only when there are pairs.
pub fn build_url(api_base_url: &str, path: &str, query: &[(String, String)]) -> DispatchResult<Url> {
    let raw = format!("{}{}", api_base_url.trim_end_matches('/'), path);
    let mut url = Url::parse(&raw).map_err(|e| DispatchError::InvalidUrl(format!("{raw}: {e}")))?;
    if !query.is_empty() {
        url.query_pairs_mut().extend_pairs(query);
    }
    Ok(url)
}

async fn read_body_limited(mut response: reqwest::Response, limit: usize) -> DispatchResult<Vec<u8>> {
    if response.content_length().is_some_and(|len| len > limit as u64) {
        return Err(DispatchError::ResponseTooLarge { limit });
    }

    let mut out: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        if out.len().saturating_add(chunk.len()) > limit {
            return Err(DispatchError::ResponseTooLarge { limit });
        }
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// Percent-encode everything outside the RFC 3986 unreserved set
fn encode_component(s: &str) -> String {
    const HEX: &[u8; 16] = b"0123456789ABCDEF";
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~') {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}
