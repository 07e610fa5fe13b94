// Server pool tests - concurrent startup, partial failure and routing across
// real mock-mcp-server processes.

use mcpeval_core::application::tooling::{PoolError, ServerPool, ToolConnection};
use mcpeval_core::config::ServerSpec;
use mcpeval_core::domain::ToolErrorKind;
use serde_json::json;
use std::time::Duration;

const MOCK_SERVER: &str = env!("CARGO_BIN_EXE_mock-mcp-server");
const STARTUP: Duration = Duration::from_secs(10);

fn mock(id: &str, args: &[&str]) -> ServerSpec {
    ServerSpec::stdio(id, MOCK_SERVER).with_args(args.iter().copied())
}

#[tokio::test]
async fn one_broken_server_does_not_stop_the_others() {
    let pool = ServerPool::build(
        &[
            mock("weather", &["--tools", "get_weather,echo"]),
            mock("broken", &["--mode", "fail-handshake"]),
            mock("hotels", &["--tools", "book_hotel,echo"]),
        ],
        STARTUP,
    )
    .await
    .expect("pool builds");

    assert_eq!(pool.connections().len(), 2);
    assert_eq!(pool.failures().len(), 1);
    assert_eq!(pool.failures()[0].server, "broken");
    assert_eq!(pool.failures()[0].kind, ToolErrorKind::Startup);

    let router = pool.router();
    assert_eq!(router.owner("echo"), Some("weather"));
    assert_eq!(router.owner("book_hotel"), Some("hotels"));
    assert_eq!(router.shadowed().len(), 1);

    let booked = pool
        .route_call("book_hotel", json!({"city": "Lisbon"}), STARTUP)
        .await
        .expect("routed");
    assert_eq!(booked, "Booked a room in Lisbon");

    assert!(pool.teardown().await.is_empty());
    assert!(pool.teardown().await.is_empty());
}

#[tokio::test]
async fn duplicate_identifiers_get_suffixes() {
    let pool = ServerPool::build(
        &[mock("mock", &["--tools", "echo"]), mock("mock", &["--tools", "get_weather"])],
        STARTUP,
    )
    .await
    .expect("pool builds");

    let ids: Vec<&str> = pool.connections().iter().map(|c| c.id()).collect();
    assert_eq!(ids, vec!["mock", "mock-2"]);
    assert_eq!(pool.router().owner("get_weather"), Some("mock-2"));
    pool.teardown().await;
}

#[tokio::test]
async fn every_server_failing_is_fatal() {
    let err = ServerPool::build(
        &[
            mock("a", &["--mode", "fail-handshake"]),
            mock("b", &["--mode", "no-tools"]),
        ],
        STARTUP,
    )
    .await
    .err()
    .expect("pool fails");

    match err {
        PoolError::AllServersFailed { failures } => {
            let kinds: Vec<ToolErrorKind> = failures.iter().map(|f| f.kind).collect();
            assert_eq!(kinds, vec![ToolErrorKind::Startup, ToolErrorKind::Discovery]);
        }
        other => panic!("unexpected error: {other}"),
    }
}
