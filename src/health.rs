//! Health check for the HTTP transport
//!
//! Reports liveness plus what the emulated server exposes, so a caller can
//! confirm the source was introspected as expected.

use {
    crate::{protocol::PROTOCOL_VERSION, registry::Registry, server::ServerState},
    serde::{Deserialize, Serialize},
    std::time::{SystemTime, UNIX_EPOCH},
};

/// Health check response structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Always "healthy" if responding
    pub status: String,

    /// Seconds since the Unix epoch
    pub timestamp: u64,

    pub version: String,
    pub server_name: String,
    pub protocol_version: String,

    /// Whether `initialize` has been received
    pub initialized: bool,

    pub tool_count: usize,
    pub resource_count: usize,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct HealthChecker {
    start_time: SystemTime,
    version: String,
}

impl HealthChecker {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            start_time: SystemTime::now(),
            version: version.into(),
        }
    }

    pub fn get_status(&self, registry: &Registry, state: ServerState) -> HealthStatus {
        let now = SystemTime::now();
        let timestamp = now.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs();
        let uptime_seconds = now
            .duration_since(self.start_time)
            .unwrap_or_default()
            .as_secs();

        HealthStatus {
            status: "healthy".to_string(),
            timestamp,
            version: self.version.clone(),
            server_name: registry.server_name().to_string(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            initialized: state == ServerState::Ready,
            tool_count: registry.tools().len(),
            resource_count: registry.resources().len(),
            uptime_seconds,
        }
    }

    pub fn get_json_status(&self, registry: &Registry, state: ServerState) -> serde_json::Value {
        serde_json::to_value(self.get_status(registry, state)).unwrap_or_else(|_| {
            serde_json::json!({
                "status": "error",
                "message": "Failed to serialize health status"
            })
        })
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new(env!("CARGO_PKG_VERSION"))
    }
}
