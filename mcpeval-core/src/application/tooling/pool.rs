use futures::future::join_all;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use super::connection::McpConnector;
use super::error::ToolInvokeError;
use super::interface::{ServerConnector, ToolConnection};
use super::router::ToolRouter;
use crate::config::ServerSpec;
use crate::domain::{ToolDescriptor, ToolErrorKind};

/// A server that did not become ready during pool startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupFailure {
    pub server: String,
    pub kind: ToolErrorKind,
    pub message: String,
}

impl fmt::Display for StartupFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.server, self.kind, self.message)
    }
}

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no tool servers configured")]
    NoServers,
    #[error("none of the {} configured tool servers started: {}", .failures.len(), render_failures(.failures))]
    AllServersFailed { failures: Vec<StartupFailure> },
}

fn render_failures(failures: &[StartupFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Every connection for one run, plus the router built over them.
pub struct ServerPool {
    connections: Vec<Arc<dyn ToolConnection>>,
    router: Arc<ToolRouter>,
    failures: Vec<StartupFailure>,
    torn_down: AtomicBool,
}

impl ServerPool {
    pub async fn build(specs: &[ServerSpec], startup_timeout: Duration) -> Result<Self, PoolError> {
        Self::build_with(specs, &McpConnector::new(startup_timeout)).await
    }

    /// Start every server concurrently; one server's failure is recorded, not raised.
    pub async fn build_with(
        specs: &[ServerSpec],
        connector: &dyn ServerConnector,
    ) -> Result<Self, PoolError> {
        if specs.is_empty() {
            return Err(PoolError::NoServers);
        }

        let specs = dedupe_identifiers(specs);
        info!(servers = specs.len(), "Starting MCP servers");
        let outcomes = join_all(specs.iter().map(|spec| connector.connect(spec))).await;

        let mut connections = Vec::new();
        let mut failures = Vec::new();
        for (spec, outcome) in specs.iter().zip(outcomes) {
            match outcome {
                Ok(connection) => connections.push(connection),
                Err(err) => {
                    error!(server = %spec.identifier, %err, "MCP server failed to start");
                    failures.push(StartupFailure {
                        server: spec.identifier.clone(),
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                }
            }
        }

        if connections.is_empty() {
            return Err(PoolError::AllServersFailed { failures });
        }

        let router = ToolRouter::build(&connections);
        info!(
            ready = connections.len(),
            failed = failures.len(),
            tools = router.len(),
            shadowed = router.shadowed().len(),
            "Server pool ready"
        );

        Ok(Self {
            connections,
            router: Arc::new(router),
            failures,
            torn_down: AtomicBool::new(false),
        })
    }

    pub fn tools(&self) -> &[ToolDescriptor] {
        self.router.descriptors()
    }

    pub fn router(&self) -> Arc<ToolRouter> {
        Arc::clone(&self.router)
    }

    pub fn connections(&self) -> &[Arc<dyn ToolConnection>] {
        &self.connections
    }

    pub fn failures(&self) -> &[StartupFailure] {
        &self.failures
    }

    pub async fn route_call(
        &self,
        name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<String, ToolInvokeError> {
        self.router.invoke(name, arguments, timeout).await
    }

    /// Close every connection; errors are logged and returned, never raised.
    pub async fn teardown(&self) -> Vec<ToolInvokeError> {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return Vec::new();
        }
        let results = join_all(self.connections.iter().map(|connection| connection.close())).await;

        let mut errors = Vec::new();
        for (connection, result) in self.connections.iter().zip(results) {
            if let Err(err) = result {
                warn!(server = connection.id(), %err, "failed to close MCP server cleanly");
                errors.push(err);
            }
        }
        info!(servers = self.connections.len(), "Server pool torn down");
        errors
    }
}

impl Drop for ServerPool {
    fn drop(&mut self) {
        if !self.torn_down.load(Ordering::SeqCst) {
            warn!("server pool dropped without teardown; stdio servers are killed on drop");
        }
    }
}

/// Make identifiers unique in spec order by suffixing `-2`, `-3`, ...
fn dedupe_identifiers(specs: &[ServerSpec]) -> Vec<ServerSpec> {
    let mut seen = HashSet::new();
    specs
        .iter()
        .map(|spec| {
            let mut spec = spec.clone();
            if !seen.insert(spec.identifier.clone()) {
                let base = spec.identifier.clone();
                let mut suffix = 2;
                while !seen.insert(format!("{base}-{suffix}")) {
                    suffix += 1;
                }
                spec.identifier = format!("{base}-{suffix}");
            }
            spec
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::tooling::test_support::{StubConnection, StubConnector};
    use serde_json::json;

    fn spec(id: &str) -> ServerSpec {
        ServerSpec::stdio(id, format!("{id}.py"))
    }

    #[tokio::test]
    async fn partial_startup_failure_keeps_the_rest() {
        let weather = StubConnection::new("weather", &["get_weather"]);
        let hotels = StubConnection::new("hotels", &["book_hotel"]);
        let connector = StubConnector::new(&[&weather, &hotels]);

        let pool = ServerPool::build_with(&[spec("weather"), spec("broken"), spec("hotels")], &connector)
            .await
            .expect("pool builds");

        assert_eq!(pool.connections().len(), 2);
        assert_eq!(pool.failures().len(), 1);
        assert_eq!(pool.failures()[0].server, "broken");
        assert_eq!(pool.failures()[0].kind, ToolErrorKind::Startup);

        let out = pool
            .route_call("book_hotel", json!({"city": "Paris"}), Duration::from_secs(1))
            .await
            .expect("routed");
        assert_eq!(out, "hotels:book_hotel");
        pool.teardown().await;
    }

    #[tokio::test]
    async fn all_servers_failing_is_fatal() {
        let connector = StubConnector::new(&[]);
        let err = ServerPool::build_with(&[spec("a"), spec("b")], &connector)
            .await
            .err()
            .expect("build fails");
        match err {
            PoolError::AllServersFailed { failures } => assert_eq!(failures.len(), 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn empty_spec_list_is_rejected() {
        let connector = StubConnector::new(&[]);
        assert!(matches!(
            ServerPool::build_with(&[], &connector).await,
            Err(PoolError::NoServers)
        ));
    }

    #[tokio::test]
    async fn teardown_closes_everything_once() {
        let weather = StubConnection::new("weather", &["get_weather"]);
        let connector = StubConnector::new(&[&weather]);
        let pool = ServerPool::build_with(&[spec("weather")], &connector)
            .await
            .expect("pool builds");

        assert!(pool.teardown().await.is_empty());
        assert!(weather.is_closed());
        assert!(pool.teardown().await.is_empty());
    }

    #[test]
    fn duplicate_identifiers_get_suffixes() {
        let specs = dedupe_identifiers(&[spec("fs"), spec("fs"), spec("git"), spec("fs")]);
        let ids: Vec<&str> = specs.iter().map(|s| s.identifier.as_str()).collect();
        assert_eq!(ids, vec!["fs", "fs-2", "git", "fs-3"]);
    }
}
