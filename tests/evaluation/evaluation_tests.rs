// End-to-end evaluation tests - scripted model, real stdio servers, real ledger.

use async_trait::async_trait;
use mcpeval_core::application::engine::EngineOptions;
use mcpeval_core::application::runner::{RunLedger, RunnerOptions, read_trajectories};
use mcpeval_core::application::{CancellationSignal, EvaluationPlan, run_evaluation};
use mcpeval_core::config::ServerSpec;
use mcpeval_core::domain::{MessageRole, Task, ToolCallRequest, ToolErrorKind, TrajectoryStatus};
use mcpeval_core::infrastructure::model::{ModelError, ModelProvider, ModelRequest, ModelResponse};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Scripted model
// ============================================================================

const MOCK_SERVER: &str = env!("CARGO_BIN_EXE_mock-mcp-server");

/// Plans from the task text: weather tasks call `get_weather` then `book_hotel`,
/// crash tasks call `crash`, everything else answers straight away.
struct PlanningModel;

#[async_trait]
impl ModelProvider for PlanningModel {
    async fn chat(&self, request: ModelRequest) -> Result<ModelResponse, ModelError> {
        let prompt = request
            .messages
            .iter()
            .find(|message| message.role == MessageRole::User)
            .map(|message| message.content.clone())
            .unwrap_or_default();
        let tool_turns = request
            .messages
            .iter()
            .filter(|message| message.role == MessageRole::Assistant)
            .count();

        let call = |id: &str, name: &str, args: serde_json::Value| -> Result<ModelResponse, ModelError> {
            Ok(ModelResponse::with_tool_calls("", vec![ToolCallRequest::new(id, name, args)]))
        };
        match (prompt.as_str(), tool_turns) {
            (p, 0) if p.contains("weather") => call("c1", "get_weather", json!({"city": "Paris"})),
            (p, 1) if p.contains("weather") => call("c2", "book_hotel", json!({"city": "Paris"})),
            (p, 0) if p.contains("crash") => call("c1", "crash", json!({})),
            _ => {
                let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
                Ok(ModelResponse::new(format!("final: {last}")))
            }
        }
    }
}

fn plan(output: PathBuf, tasks: Vec<Task>) -> EvaluationPlan {
    EvaluationPlan {
        servers: vec![
            ServerSpec::stdio("weather", MOCK_SERVER).with_args(["--tools", "get_weather"]),
            ServerSpec::stdio("hotels", MOCK_SERVER).with_args(["--tools", "book_hotel"]),
            ServerSpec::stdio("fragile", MOCK_SERVER).with_args(["--tools", "crash"]),
        ],
        tasks,
        output,
        engine: EngineOptions::new("scripted", "planner"),
        runner: RunnerOptions {
            concurrency: 2,
            ..RunnerOptions::default()
        },
        startup_timeout: Duration::from_secs(10),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn weather_and_hotel_task_routes_to_both_servers() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("results").join("trajectories.jsonl");
    let tasks = vec![
        Task::new("trip", "Check the weather in Paris and book a hotel"),
        Task::new("hello", "Say hello"),
    ];

    let report = run_evaluation(plan(output.clone(), tasks), Arc::new(PlanningModel), &CancellationSignal::new())
        .await
        .expect("evaluation runs");
    assert_eq!(report.summary.completed, 2);
    assert!(report.startup_failures.is_empty());

    let trajectories = read_trajectories(&output).await.expect("ledger");
    let trip = trajectories
        .iter()
        .find(|t| t.task_id == "trip")
        .expect("trip trajectory");
    assert_eq!(trip.status, TrajectoryStatus::Completed);
    assert_eq!(trip.turns_used, 3);
    let servers: Vec<Option<&str>> = trip
        .tool_call_results
        .iter()
        .map(|result| result.server.as_deref())
        .collect();
    assert_eq!(servers, vec![Some("weather"), Some("hotels")]);
    assert_eq!(trip.final_response.as_deref(), Some("final: Booked a room in Paris"));
}

#[tokio::test]
async fn crashed_server_ends_only_its_task_and_resume_is_idempotent() {
    let dir = tempfile::tempdir().expect("tempdir");
    let output = dir.path().join("trajectories.jsonl");
    let tasks = vec![
        Task::new("t1", "Say hello"),
        Task::new("t2", "Please crash the server"),
        Task::new("t3", "What is the weather like?"),
        Task::new("t4", "Say goodbye"),
    ];

    let first = run_evaluation(
        plan(output.clone(), tasks.clone()),
        Arc::new(PlanningModel),
        &CancellationSignal::new(),
    )
    .await
    .expect("first run");
    assert_eq!((first.summary.completed, first.summary.error), (3, 1));

    let trajectories = read_trajectories(&output).await.expect("ledger");
    let crashed = trajectories.iter().find(|t| t.task_id == "t2").expect("t2");
    assert_eq!(crashed.status, TrajectoryStatus::Error);
    assert_eq!(crashed.tool_call_results[0].error, Some(ToolErrorKind::ConnectionLost));

    let second = run_evaluation(plan(output.clone(), tasks), Arc::new(PlanningModel), &CancellationSignal::new())
        .await
        .expect("second run");
    assert_eq!(second.summary.skipped, 4);
    assert_eq!(second.summary.executed(), 0);
    assert_eq!(read_trajectories(&output).await.expect("ledger").len(), 4);
    assert_eq!(RunLedger::load(&output).await.expect("load").len(), 4);
}
