use {serde_json::Value, std::time::Duration, thiserror::Error};

/// JSON-RPC error codes used on the wire.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const NOT_INITIALIZED: i32 = -32002;
}

#[derive(Debug, Error)]
pub enum McpError {
    // Protocol Errors
    #[error("Method not found: {0}")]
    UnknownMethod(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Server not initialized")]
    NotInitialized,

    #[error("Parse error: {0}")]
    Parse(String),

    // Registry lookups
    #[error("Resource not found: {0}")]
    UnknownResource(String),

    // Upstream API failures surfaced at protocol level (resources/read)
    #[error("{0}")]
    Dispatch(#[from] DispatchError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    /// Convert to JSON-RPC error code
    pub fn error_code(&self) -> i32 {
        match self {
            Self::UnknownMethod(_) => codes::METHOD_NOT_FOUND,
            Self::InvalidParams(_) => codes::INVALID_PARAMS,
            Self::InvalidRequest(_) | Self::UnknownResource(_) => codes::INVALID_REQUEST,
            Self::NotInitialized => codes::NOT_INITIALIZED,
            Self::Parse(_) | Self::Json(_) => codes::PARSE_ERROR,
            Self::Dispatch(_) | Self::Internal(_) => codes::INTERNAL_ERROR,
        }
    }

    /// Create JSON-RPC error response
    pub fn to_json_rpc_error(&self, id: Option<Value>) -> Value {
        serde_json::json!({
            "jsonrpc": "2.0",
            "error": {
                "code": self.error_code(),
                "message": self.to_string(),
            },
            "id": id,
        })
    }
}

pub type McpResult<T> = Result<T, McpError>;

/// Failures of a single outbound API call made on behalf of a tool.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("API returned {status} {reason}: {body}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Missing required path parameter '{0}'")]
    MissingPathArgument(String),

    #[error("Response body exceeds {limit} bytes")]
    ResponseTooLarge { limit: usize },
}

impl DispatchError {
    /// HTTP status carried by the error, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body: String::new(),
            };
        }
        Self::Transport(err.to_string())
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors seen by callers awaiting a response over the multiplexed stream.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Request '{method}' (id {id}) timed out after {}ms", timeout.as_millis())]
    Timeout {
        method: String,
        id: String,
        timeout: Duration,
    },

    #[error("Stream closed")]
    StreamClosed,

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Server returned error {code}: {message}")]
    Rpc {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("Malformed response for request {id}: {message}")]
    MalformedResponse { id: String, message: String },

    #[error("Unexpected result: {0}")]
    UnexpectedResult(String),

    #[error("Failed to start server process: {0}")]
    Spawn(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClientError {
    /// Whether this is a correlation timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Rebuild an error for fan-out to every pending request.
    pub(crate) fn duplicate(&self) -> Self {
        match self {
            Self::StreamClosed => Self::StreamClosed,
            Self::Stream(message) => Self::Stream(message.clone()),
            other => Self::Stream(other.to_string()),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
