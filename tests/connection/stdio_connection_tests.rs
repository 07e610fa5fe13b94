// Stdio connection tests - real subprocess lifecycle against mock-mcp-server
//
// Handshake, paginated discovery, calls, remote failures, timeouts and crashes.

use futures::future::join_all;
use mcpeval_core::application::tooling::{ConnectionState, McpConnection, ToolConnection, ToolInvokeError};
use mcpeval_core::config::ServerSpec;
use mcpeval_core::domain::ToolErrorKind;
use serde_json::json;
use std::time::Duration;

// ============================================================================
// Helpers
// ============================================================================

const MOCK_SERVER: &str = env!("CARGO_BIN_EXE_mock-mcp-server");
const STARTUP: Duration = Duration::from_secs(10);
const CALL: Duration = Duration::from_secs(5);

fn mock(id: &str, args: &[&str]) -> ServerSpec {
    ServerSpec::stdio(id, MOCK_SERVER).with_args(args.iter().copied())
}

// ============================================================================
// Startup
// ============================================================================

#[tokio::test]
async fn handshake_and_paginated_discovery() {
    let connection = McpConnection::start(
        mock("mock", &["--tools", "echo,get_weather,book_hotel", "--page-size", "2"]),
        STARTUP,
    )
    .await
    .expect("server starts");

    assert_eq!(connection.state(), ConnectionState::Ready);
    assert_eq!(connection.instructions(), Some("Mock server for integration tests."));
    let names: Vec<&str> = connection.tools().iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["echo", "get_weather", "book_hotel"]);
    assert!(connection.tools().iter().all(|tool| tool.owner == "mock"));

    connection.close().await.expect("close");
    assert_eq!(connection.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn server_exiting_during_handshake_is_a_startup_error() {
    let err = McpConnection::start(mock("broken", &["--mode", "fail-handshake"]), STARTUP)
        .await
        .err()
        .expect("startup fails");
    assert_eq!(err.kind(), ToolErrorKind::Startup);
}

#[tokio::test]
async fn silent_server_times_out_during_startup() {
    let err = McpConnection::start(mock("silent", &["--mode", "silent"]), Duration::from_millis(300))
        .await
        .err()
        .expect("startup times out");
    assert_eq!(err.kind(), ToolErrorKind::Startup);
}

#[tokio::test]
async fn empty_or_malformed_tool_lists_fail_discovery() {
    for mode in ["no-tools", "malformed"] {
        let err = McpConnection::start(mock(mode, &["--mode", mode]), STARTUP)
            .await
            .err()
            .expect("discovery fails");
        assert_eq!(err.kind(), ToolErrorKind::Discovery, "mode {mode}");
    }
}

#[tokio::test]
async fn missing_executable_fails_to_spawn() {
    let spec = ServerSpec::stdio("ghost", "/definitely/not/a/server");
    let err = McpConnection::start(spec, STARTUP).await.err().expect("spawn fails");
    assert!(matches!(err, ToolInvokeError::Spawn { .. }));
}

// ============================================================================
// Tool calls
// ============================================================================

#[tokio::test]
async fn calls_return_text_content() {
    let connection = McpConnection::start(mock("mock", &["--tools", "echo,get_weather"]), STARTUP)
        .await
        .expect("server starts");

    let echoed = connection
        .call_tool("echo", json!({"text": "hello"}), CALL)
        .await
        .expect("echo");
    assert_eq!(echoed, "hello");

    let weather = connection
        .call_tool("get_weather", json!({"city": "Paris"}), CALL)
        .await
        .expect("weather");
    assert_eq!(weather, "Sunny and 24C in Paris");
    connection.close().await.expect("close");
}

#[tokio::test]
async fn concurrent_calls_are_correlated() {
    let connection = McpConnection::start(mock("mock", &["--tools", "echo"]), STARTUP)
        .await
        .expect("server starts");

    let calls = (0..8).map(|n| {
        let connection = &connection;
        async move {
            connection
                .call_tool("echo", json!({"text": format!("message {n}")}), CALL)
                .await
        }
    });
    let results = join_all(calls).await;
    for (n, result) in results.into_iter().enumerate() {
        assert_eq!(result.expect("echo"), format!("message {n}"));
    }
    connection.close().await.expect("close");
}

#[tokio::test]
async fn remote_failure_is_reported_with_its_text() {
    let connection = McpConnection::start(mock("mock", &["--tools", "fail"]), STARTUP)
        .await
        .expect("server starts");
    let err = connection.call_tool("fail", json!({}), CALL).await.unwrap_err();
    assert_eq!(err.kind(), ToolErrorKind::RemoteFailure);
    assert!(err.to_string().contains("tool failed on purpose"));
    assert_eq!(connection.state(), ConnectionState::Ready);
    connection.close().await.expect("close");
}

#[tokio::test]
async fn slow_call_times_out_without_killing_the_connection() {
    let connection = McpConnection::start(mock("mock", &["--tools", "sleep,echo"]), STARTUP)
        .await
        .expect("server starts");

    let err = connection
        .call_tool("sleep", json!({"ms": 1500}), Duration::from_millis(200))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ToolErrorKind::Timeout);
    assert_eq!(connection.state(), ConnectionState::Ready);

    let echoed = connection
        .call_tool("echo", json!({"text": "still here"}), CALL)
        .await
        .expect("echo after timeout");
    assert_eq!(echoed, "still here");
    connection.close().await.expect("close");
}

#[tokio::test]
async fn crash_mid_call_is_connection_lost() {
    let connection = McpConnection::start(mock("mock", &["--tools", "crash,echo"]), STARTUP)
        .await
        .expect("server starts");

    let err = connection.call_tool("crash", json!({}), CALL).await.unwrap_err();
    assert_eq!(err.kind(), ToolErrorKind::ConnectionLost);
    assert_eq!(connection.state(), ConnectionState::Failed);

    let err = connection
        .call_tool("echo", json!({"text": "anyone?"}), CALL)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ToolErrorKind::ConnectionLost);
    connection.close().await.expect("close after crash");
}
