//! Protocol Server Tests
//!
//! The emulated jsonplaceholder server, end to end over the real dispatcher.

use bridgemcp::{error::codes, ProtocolServer, ServerState};
use serde_json::{json, Value};
use std::sync::Arc;

mod helpers;
use helpers::*;

fn request(id: i64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

async fn initialized(server: &ProtocolServer) {
    let response = server
        .handle_message(&request(
            0,
            "initialize",
            json!({
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": {"name": "integration", "version": "1.0.0"}
            }),
        ))
        .await
        .unwrap();
    assert!(response.get("result").is_some(), "initialize failed: {response}");
}

fn tool_text(response: &Value) -> &str {
    response["result"]["content"][0]["text"]
        .as_str()
        .unwrap_or_else(|| panic!("no text content in {response}"))
}

#[tokio::test]
async fn test_full_session() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_test_tracing();
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());

    // Initialize
    let init = server
        .handle_message(&request(1, "initialize", json!({"protocolVersion": "2025-06-18"})))
        .await
        .unwrap();
    assert_eq!(init["id"], 1);
    assert_eq!(init["result"]["protocolVersion"], "2025-06-18");
    assert_eq!(init["result"]["serverInfo"]["name"], "jsonplaceholder-api");
    assert!(init["result"]["capabilities"]["tools"].is_object());
    assert!(init["result"]["capabilities"]["resources"].is_object());
    assert_eq!(server.state(), ServerState::Ready);

    // tools/list
    let tools = server.handle_message(&request(2, "tools/list", json!({}))).await.unwrap();
    let tools = tools["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 5);
    assert_eq!(tools[1]["name"], "get_post_by_id");
    assert!(tools[1]["inputSchema"]["properties"]["id"].is_object());

    // tools/call
    let call = server
        .handle_message(&request(
            3,
            "tools/call",
            json!({"name": "get_post_by_id", "arguments": {"id": 5}}),
        ))
        .await
        .unwrap();
    assert!(call["result"].get("isError").is_none());
    let echo = echoed(tool_text(&call));
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["path"], "/posts/5");
    assert_eq!(echo["query"], "");

    // resources/list
    let resources = server
        .handle_message(&request(4, "resources/list", json!({})))
        .await
        .unwrap();
    assert_eq!(resources["result"]["resources"][0]["uri"], "posts://all");

    // resources/read
    let read = server
        .handle_message(&request(5, "resources/read", json!({"uri": "posts://all"})))
        .await
        .unwrap();
    let contents = &read["result"]["contents"][0];
    assert_eq!(contents["uri"], "posts://all");
    assert_eq!(contents["mimeType"], "application/json");
    assert_eq!(echoed(contents["text"].as_str().unwrap())["path"], "/posts");

    Ok(())
}

#[tokio::test]
async fn test_requests_before_initialize_are_rejected() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());

    for (id, method) in [(1, "tools/list"), (2, "resources/list")] {
        let response = server.handle_message(&request(id, method, json!({}))).await.unwrap();
        assert_eq!(response["error"]["code"], codes::NOT_INITIALIZED);
        assert_eq!(response["id"], id);
    }
    assert_eq!(server.state(), ServerState::Initializing);
}

#[tokio::test]
async fn test_unknown_tool_is_tool_error_not_protocol_error() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let response = server
        .handle_message(&request(7, "tools/call", json!({"name": "launch_rocket", "arguments": {}})))
        .await
        .unwrap();

    assert!(response.get("error").is_none());
    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).starts_with("Error: "));
    assert!(tool_text(&response).contains("launch_rocket"));
}

#[tokio::test]
async fn test_upstream_failure_becomes_error_content() {
    let api = MockApi::start().await;
    // Every path on this base is answered with 404
    let server = fixture_server(PYTHON_FIXTURE, &format!("{}/missing", api.base_url()));
    initialized(&server).await;

    let response = server
        .handle_message(&request(8, "tools/call", json!({"name": "get_posts", "arguments": {}})))
        .await
        .unwrap();

    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("404"));
}

#[tokio::test]
async fn test_inferred_tool_dispatches_with_body() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let response = server
        .handle_message(&request(
            9,
            "tools/call",
            json!({"name": "update_post", "arguments": {"id": 2, "title": "renamed"}}),
        ))
        .await
        .unwrap();

    let echo = echoed(tool_text(&response));
    assert_eq!(echo["method"], "PUT");
    assert_eq!(echo["path"], "/posts/2");
    assert_eq!(echo["body"], json!({"title": "renamed"}));
}

#[tokio::test]
async fn test_query_tool_forwards_arguments() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let response = server
        .handle_message(&request(10, "tools/call", json!({"name": "get_posts", "arguments": {"userId": 1}})))
        .await
        .unwrap();

    assert_eq!(echoed(tool_text(&response))["query"], "userId=1");
}

#[tokio::test]
async fn test_missing_path_argument_is_tool_error() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let response = server
        .handle_message(&request(11, "tools/call", json!({"name": "get_post_by_id"})))
        .await
        .unwrap();

    assert_eq!(response["result"]["isError"], true);
    assert!(tool_text(&response).contains("'id'"));
}

#[tokio::test]
async fn test_resource_errors() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let unknown = server
        .handle_message(&request(12, "resources/read", json!({"uri": "comments://all"})))
        .await
        .unwrap();
    assert_eq!(unknown["error"]["code"], codes::INVALID_REQUEST);

    let offline = fixture_server(PYTHON_FIXTURE, &closed_port_url().await);
    initialized(&offline).await;
    let failed = offline
        .handle_message(&request(13, "resources/read", json!({"uri": "users://all"})))
        .await
        .unwrap();
    assert_eq!(failed["error"]["code"], codes::INTERNAL_ERROR);
    assert_eq!(failed["id"], 13);
}

#[tokio::test]
async fn test_envelope_errors() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let unknown = server
        .handle_message(&request(14, "prompts/list", json!({})))
        .await
        .unwrap();
    assert_eq!(unknown["error"]["code"], codes::METHOD_NOT_FOUND);

    let bad_version = server
        .handle_message(&json!({"jsonrpc": "1.0", "id": 15, "method": "tools/list"}))
        .await
        .unwrap();
    assert_eq!(bad_version["error"]["code"], codes::INVALID_REQUEST);
    assert_eq!(bad_version["id"], 15);

    let missing_params = server
        .handle_message(&json!({"jsonrpc": "2.0", "id": 16, "method": "tools/call"}))
        .await
        .unwrap();
    assert_eq!(missing_params["error"]["code"], codes::INVALID_PARAMS);

    let garbage = server.handle_bytes(b"{\"jsonrpc\": \"2.0\", \"id\": ").await.unwrap();
    assert_eq!(garbage["error"]["code"], codes::PARSE_ERROR);
    assert_eq!(garbage["id"], Value::Null);
}

#[tokio::test]
async fn test_notifications_get_no_reply() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let reply = server
        .handle_message(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
        .await;
    assert!(reply.is_none());

    let cancelled = server
        .handle_message(&json!({"jsonrpc": "2.0", "method": "notifications/cancelled", "params": {"requestId": 3}}))
        .await;
    assert!(cancelled.is_none());
}

#[tokio::test]
async fn test_concurrent_tool_calls_share_the_registry() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let calls = (1..=20).map(|id| {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            let response = server
                .handle_message(&request(
                    id,
                    "tools/call",
                    json!({"name": "get_post_by_id", "arguments": {"id": id}}),
                ))
                .await
                .unwrap();
            (id, response)
        })
    });

    for call in calls.collect::<Vec<_>>() {
        let (id, response) = call.await.unwrap();
        assert_eq!(response["id"], id);
        assert_eq!(echoed(tool_text(&response))["path"], format!("/posts/{id}"));
    }
}

#[tokio::test]
async fn test_typescript_server_resource_paths() {
    let api = MockApi::start().await;
    let server = fixture_server(TYPESCRIPT_FIXTURE, &api.base_url());
    initialized(&server).await;

    let read = server
        .handle_message(&request(1, "resources/read", json!({"uri": "pets://available"})))
        .await
        .unwrap();
    let text = read["result"]["contents"][0]["text"].as_str().unwrap();
    assert_eq!(echoed(text)["path"], "/pets/available");

    let patch = server
        .handle_message(&request(
            2,
            "tools/call",
            json!({"name": "update_pet_status", "arguments": {"petId": 4, "status": "sold"}}),
        ))
        .await
        .unwrap();
    let echo = echoed(tool_text(&patch));
    assert_eq!(echo["method"], "PATCH");
    assert_eq!(echo["path"], "/pets/4");
    assert_eq!(echo["body"], json!({"status": "sold"}));
}

#[tokio::test]
async fn test_string_id_argument_fills_path() {
    let api = MockApi::start().await;
    let server = fixture_server(PYTHON_FIXTURE, &api.base_url());
    initialized(&server).await;

    let response = server
        .handle_message(&request(
            17,
            "tools/call",
            json!({"name": "get_post_by_id", "arguments": {"id": "7"}}),
        ))
        .await
        .unwrap();

    let echo = echoed(tool_text(&response));
    assert_eq!(echo["method"], "GET");
    assert_eq!(echo["path"], "/posts/7");
    assert_eq!(echo["query"], "");
}

#[tokio::test]
async fn test_unregistered_resource_is_invalid_request() {
    let api = MockApi::start().await;
    // The petstore server declares no posts resource
    let server = fixture_server(TYPESCRIPT_FIXTURE, &api.base_url());
    initialized(&server).await;

    let response = server
        .handle_message(&request(18, "resources/read", json!({"uri": "posts://all"})))
        .await
        .unwrap();

    assert_eq!(response["id"], 18);
    assert_eq!(response["error"]["code"], codes::INVALID_REQUEST);
    assert!(response.get("result").is_none());
}
