//! Structured logging
//!
//! `tracing` events for both sides of the bridge. The subscriber writes to
//! stderr: in stdio mode stdout carries protocol frames only.

use {
    std::time::{Duration, Instant},
    tracing::{debug, error, info, span, warn, Level, Span},
    tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter},
    uuid::Uuid,
};

/// Target used for diagnostic lines read from a server process
pub const SERVER_LOG_TARGET: &str = "bridgemcp::server_log";

/// Initialize the tracing subscriber. Calling it twice is harmless.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bridgemcp=info"));

    let json_format = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let result = if json_format {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(false)
            .with_writer(std::io::stderr);
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
    };

    if result.is_ok() {
        debug!("Tracing initialized");
    }
}

/// Identity of one client-side connection to a server process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct McpConnectionId(pub String);

impl McpConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for McpConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for McpConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn connection_span(connection_id: &McpConnectionId) -> Span {
    span!(
        Level::INFO,
        "mcp_connection",
        connection_id = %connection_id,
        start_time = ?Instant::now()
    )
}

pub fn request_span(method: &str, request_id: Option<&serde_json::Value>) -> Span {
    span!(
        Level::INFO,
        "mcp_request",
        method = %method,
        request_id = ?request_id,
    )
}

// Server side

pub fn log_handler_success(method: &str, duration: Duration) {
    debug!(
        method = %method,
        duration_ms = duration.as_millis(),
        event = "handler_success",
        "Handled method"
    );
}

pub fn log_handler_error(method: &str, error: &str, duration: Duration) {
    warn!(
        method = %method,
        error = %error,
        duration_ms = duration.as_millis(),
        event = "handler_error",
        "Method failed"
    );
}

pub fn log_tool_call(tool: &str, args: &serde_json::Value) {
    info!(
        tool = %tool,
        args = %args,
        event = "tool_call",
        "Tool call requested"
    );
}

pub fn log_unknown_tool(tool: &str) {
    warn!(tool = %tool, event = "unknown_tool", "Unknown tool requested");
}

pub fn log_dispatch(method: &str, url: &str, status: Option<u16>, duration: Duration) {
    match status {
        Some(status) => info!(
            http_method = %method,
            url = %url,
            status,
            duration_ms = duration.as_millis(),
            event = "dispatch",
            "API call completed"
        ),
        None => error!(
            http_method = %method,
            url = %url,
            duration_ms = duration.as_millis(),
            event = "dispatch_failed",
            "API call failed before a response"
        ),
    }
}

pub fn log_parse_error(error: &str, raw_message: &str) {
    error!(
        error = %error,
        raw_message = %raw_message,
        event = "parse_error",
        "Failed to parse message"
    );
}

// Client side

pub fn log_server_line(connection_id: &McpConnectionId, line: &str) {
    debug!(
        target: SERVER_LOG_TARGET,
        connection_id = %connection_id,
        line = %line,
        "server output"
    );
}

pub fn log_unmatched_frame(connection_id: &McpConnectionId, id: &str) {
    warn!(
        connection_id = %connection_id,
        id = %id,
        event = "unmatched_frame",
        "Dropping response with no pending request"
    );
}

pub fn log_malformed_frame(connection_id: &McpConnectionId, error: &str, id: Option<&str>) {
    warn!(
        connection_id = %connection_id,
        error = %error,
        id = id,
        event = "malformed_frame",
        "Received malformed protocol frame"
    );
}

pub fn log_oversized_line(connection_id: &McpConnectionId, size: usize, limit: usize) {
    warn!(
        connection_id = %connection_id,
        size,
        limit,
        event = "oversized_line",
        "Discarding inbound line over size limit"
    );
}

pub fn log_request_timeout(connection_id: &McpConnectionId, method: &str, id: &str, timeout: Duration) {
    warn!(
        connection_id = %connection_id,
        method = %method,
        id = %id,
        timeout_ms = timeout.as_millis(),
        event = "request_timeout",
        "Request timed out"
    );
}

pub fn log_stream_closed(connection_id: &McpConnectionId, pending: usize, reason: &str) {
    info!(
        connection_id = %connection_id,
        pending,
        reason = %reason,
        event = "stream_closed",
        "Inbound stream ended"
    );
}
