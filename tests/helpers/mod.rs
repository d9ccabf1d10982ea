//! Test helpers for integration tests
//!
//! A throwaway target API on a dynamic port, fixture loading, and protocol
//! servers wired to the real dispatcher.

#![allow(dead_code)]

use bridgemcp::{
    CallDispatcher, Dispatch, DispatcherConfig, ProtocolServer, Registry, SourceIntrospector,
};
use serde_json::{json, Value};
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_stream::wrappers::TcpListenerStream;
use warp::{
    http::{Method, StatusCode},
    hyper::body::Bytes,
    path::FullPath,
    reply, Filter, Reply,
};

pub const PYTHON_FIXTURE: &str = "jsonplaceholder_server.py";
pub const TYPESCRIPT_FIXTURE: &str = "petstore_server.ts";

/// Size of the `/large` payload, above `DispatcherConfig::strict()`'s limit
pub const LARGE_BODY_BYTES: usize = 300 * 1024;

/// Initialize tracing for tests (quiet unless RUST_LOG is set)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn read_fixture(name: &str) -> String {
    std::fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("fixture {name} is readable: {e}"))
}

/// Registry of a fixture, pointed at `api_base_url`
pub fn fixture_registry(name: &str, api_base_url: &str) -> Registry {
    SourceIntrospector::parse(&read_fixture(name)).with_api_base_url(api_base_url)
}

/// Protocol server for a fixture, dispatching to `api_base_url`
pub fn fixture_server(name: &str, api_base_url: &str) -> Arc<ProtocolServer> {
    let dispatcher: Arc<dyn Dispatch> =
        Arc::new(CallDispatcher::new(DispatcherConfig::strict()).expect("client builds"));
    Arc::new(ProtocolServer::new(
        Arc::new(fixture_registry(name, api_base_url)),
        dispatcher,
    ))
}

/// Echoing target API.
///
/// Every request is answered with `{method, path, query, body}` except:
/// - `/missing...` answers 404 with a text body
/// - `/text` answers 200 with `plain body`
/// - `/large` answers 200 with a body of [`LARGE_BODY_BYTES`]
pub struct MockApi {
    pub addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl MockApi {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock api");
        let addr = listener.local_addr().expect("mock api address");

        let raw_query = warp::query::raw()
            .or(warp::any().map(String::new))
            .unify();
        let routes = warp::method()
            .and(warp::path::full())
            .and(raw_query)
            .and(warp::body::bytes())
            .map(respond);

        let handle = tokio::spawn(warp::serve(routes).run_incoming(TcpListenerStream::new(listener)));
        Self { addr, handle }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

impl Drop for MockApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn respond(method: Method, path: FullPath, query: String, body: Bytes) -> reply::Response {
    let path = path.as_str();
    if path.starts_with("/missing") {
        return reply::with_status("not here", StatusCode::NOT_FOUND).into_response();
    }
    match path {
        "/text" => "plain body".into_response(),
        "/large" => "x".repeat(LARGE_BODY_BYTES).into_response(),
        _ => {
            let body = serde_json::from_slice::<Value>(&body).unwrap_or(Value::Null);
            reply::json(&json!({
                "method": method.as_str(),
                "path": path,
                "query": query,
                "body": body,
            }))
            .into_response()
        }
    }
}

/// Parse the JSON text carried by a tool result or resource
pub fn echoed(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|e| panic!("echo body is JSON ({e}): {text}"))
}

/// An address nothing listens on
pub async fn closed_port_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("address");
    drop(listener);
    format!("http://{addr}")
}
