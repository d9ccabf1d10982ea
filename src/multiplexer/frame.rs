//! Classification of inbound lines
//!
//! A server process writes protocol frames and free-form diagnostics to the
//! same stream. Only lines carrying a JSON-RPC envelope take part in
//! correlation; everything else is log output.

use {
    crate::error::ClientError,
    once_cell::sync::Lazy,
    regex::Regex,
    serde_json::{Map, Value},
};

static SALVAGE_ID: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""id"\s*:\s*(?:"((?:[^"\\]|\\.)*)"|(-?\d+))"#).expect("id salvage regex must compile")
});

/// Error object of a response frame
#[derive(Debug, Clone, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    pub data: Option<Value>,
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        ClientError::Rpc {
            code: err.code,
            message: err.message,
            data: err.data,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Blank line
    Empty,
    /// Diagnostic output
    Log(String),
    /// Carries `method`: an echoed request, a server request or a notification
    Request { method: String, id: Option<String> },
    /// Response routed by id
    Response {
        id: String,
        outcome: Result<Value, RpcError>,
    },
    /// Response without a usable id (e.g. a parse-error reply)
    Orphan { error: Option<RpcError> },
    /// Looked like a frame but could not be interpreted
    Malformed { id: Option<String>, error: String },
}

/// Whether a line carries a recognizable JSON-RPC envelope
pub fn looks_like_frame(line: &str) -> bool {
    let line = line.trim();
    line.starts_with('{') && line.contains("\"jsonrpc\"")
}

pub fn classify(line: &str) -> InboundFrame {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return InboundFrame::Empty;
    }
    if !looks_like_frame(trimmed) {
        return InboundFrame::Log(line.to_string());
    }

    let object = match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            return InboundFrame::Malformed {
                id: None,
                error: "frame is not a JSON object".to_string(),
            }
        }
        Err(e) => {
            return InboundFrame::Malformed {
                id: salvage_id(trimmed),
                error: e.to_string(),
            }
        }
    };

    let id = object.get("id").and_then(id_string);
    if let Some(method) = object.get("method") {
        return InboundFrame::Request {
            method: method.as_str().unwrap_or_default().to_string(),
            id,
        };
    }

    let Some(id) = id else {
        return InboundFrame::Orphan {
            error: object.get("error").map(rpc_error),
        };
    };

    match (object.get("error"), object.get("result")) {
        (Some(error), _) if !error.is_null() => InboundFrame::Response {
            id,
            outcome: Err(rpc_error(error)),
        },
        (_, Some(result)) => InboundFrame::Response {
            id,
            outcome: Ok(result.clone()),
        },
        _ => InboundFrame::Malformed {
            id: Some(id),
            error: "response carries neither result nor error".to_string(),
        },
    }
}

/// Recover the id of a frame that failed to parse
pub fn salvage_id(line: &str) -> Option<String> {
    let caps = SALVAGE_ID.captures(line)?;
    caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str().to_string())
}

/// Ids are matched as strings; numeric ids compare by their decimal form.
fn id_string(id: &Value) -> Option<String> {
    match id {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn rpc_error(error: &Value) -> RpcError {
    let empty = Map::new();
    let object = error.as_object().unwrap_or(&empty);
    RpcError {
        code: object.get("code").and_then(Value::as_i64).unwrap_or(-32603),
        message: object
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string()),
        data: object.get("data").cloned(),
    }
}
