//! Runtime configuration for the bridge
//!
//! Plain serde structs with sensible defaults; the binary fills them from CLI
//! flags and environment variables.

use {
    serde::{Deserialize, Serialize},
    std::time::Duration,
};

/// Settings for the client side of the multiplexed stream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// How long a request may stay in flight before it is rejected
    pub request_timeout: Duration,

    /// Inbound lines longer than this are dropped
    pub max_line_bytes: usize,

    /// Buffered diagnostic lines kept for slow log subscribers
    pub log_channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            max_line_bytes: 2 * 1024 * 1024, // 2MB
            log_channel_capacity: 256,
        }
    }
}

impl ClientConfig {
    /// Same defaults with a different request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Settings for outbound API calls made by tools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Per-request timeout, covering connect and body transfer
    pub timeout: Duration,

    /// Upper bound on a response body
    pub max_response_bytes: usize,

    pub user_agent: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_response_bytes: 10 * 1024 * 1024, // 10MB
            user_agent: format!("bridgemcp/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl DispatcherConfig {
    /// Tight limits for tests or constrained sandboxes
    pub fn strict() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_response_bytes: 256 * 1024, // 256KB
            ..Self::default()
        }
    }
}
