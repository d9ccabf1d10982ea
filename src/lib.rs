//! Execution and protocol bridge for generated MCP servers
//!
//! Recovers a tool/resource registry from generated server source, emulates
//! that server by dispatching tool calls to the target HTTP API, and drives a
//! running server from the client side over one multiplexed line stream.

pub mod client;
pub mod config;
pub mod dispatch;
pub mod environment;
pub mod error;
pub mod health;
pub mod http;
pub mod introspect;
pub mod logging;
pub mod multiplexer;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod stdio;

// Re-export key types
pub use client::McpClient;
pub use config::{ClientConfig, DispatcherConfig};
pub use dispatch::{CallDispatcher, Dispatch, DispatchResponse};
pub use environment::{Environment, EnvironmentConfig};
pub use error::{ClientError, DispatchError, McpError};
pub use introspect::SourceIntrospector;
pub use multiplexer::StreamMultiplexer;
pub use protocol::McpProtocol;
pub use registry::{CallTemplate, HttpMethod, Registry, ResourceDefinition, ToolDefinition};
pub use server::{ProtocolServer, ServerState};
