use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::errors::EngineError;
use super::options::EngineOptions;
use crate::application::cancel::CancellationSignal;
use crate::application::tooling::{ToolRouter, normalize_arguments};
use crate::domain::{
    ChatMessage, Task, ToolCallRequest, ToolErrorKind, ToolResult, Trajectory, TrajectoryStatus,
};
use crate::infrastructure::model::{ModelProvider, ModelRequest, ModelResponse};

enum EngineState {
    AwaitingModel,
    AwaitingTools(Vec<ToolCallRequest>),
    Terminated(Termination),
}

enum Termination {
    Completed(String),
    MaxTurnsExceeded,
    Fatal(EngineError),
}

/// Drives one task's conversation between the model and the tool router.
pub struct ConversationEngine {
    provider: Arc<dyn ModelProvider>,
    router: Arc<ToolRouter>,
    options: EngineOptions,
}

impl ConversationEngine {
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        router: Arc<ToolRouter>,
        options: EngineOptions,
    ) -> Self {
        Self {
            provider,
            router,
            options,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Run `task` to a terminal state.
    ///
    /// Completion, an exhausted turn budget and fatal errors all yield a finished
    /// trajectory. Only cancellation returns `Err`, and the partial run is discarded.
    pub async fn run(
        &self,
        task: &Task,
        cancel: &CancellationSignal,
    ) -> Result<Trajectory, EngineError> {
        let mut trajectory = Trajectory::begin(task, &self.options.provider, &self.options.model);
        if let Some(system) = self
            .options
            .system_prompt
            .as_deref()
            .filter(|prompt| !prompt.trim().is_empty())
        {
            trajectory.push_message(ChatMessage::system(system));
        }
        trajectory.push_message(ChatMessage::user(task.prompt()));

        info!(
            task_id = %task.id,
            max_turns = self.options.max_turns,
            tools = self.router.len(),
            "Task started"
        );

        let mut seen_call_ids = HashSet::new();
        let mut state = EngineState::AwaitingModel;
        let termination = loop {
            state = match state {
                EngineState::AwaitingModel => {
                    if trajectory.turns_used >= self.options.max_turns {
                        EngineState::Terminated(Termination::MaxTurnsExceeded)
                    } else {
                        match self.request_turn(&trajectory, cancel).await {
                            Ok(response) => {
                                trajectory.turns_used += 1;
                                self.accept_response(&mut trajectory, response, &mut seen_call_ids)
                            }
                            Err(EngineError::Cancelled) => return Err(EngineError::Cancelled),
                            Err(err) => EngineState::Terminated(Termination::Fatal(err)),
                        }
                    }
                }
                EngineState::AwaitingTools(calls) => {
                    self.run_tools(&mut trajectory, calls, cancel).await?
                }
                EngineState::Terminated(termination) => break termination,
            };
        };

        match termination {
            Termination::Completed(answer) => {
                trajectory.final_response = Some(answer);
                trajectory.finish(TrajectoryStatus::Completed, None);
            }
            Termination::MaxTurnsExceeded => {
                warn!(task_id = %task.id, turns = trajectory.turns_used, "Turn budget exhausted");
                trajectory.finish(TrajectoryStatus::MaxTurnsExceeded, None);
            }
            Termination::Fatal(err) => {
                warn!(task_id = %task.id, %err, "Task ended with a fatal error");
                trajectory.finish(TrajectoryStatus::Error, Some(err.to_string()));
            }
        }

        info!(
            task_id = %task.id,
            status = trajectory.status.as_str(),
            turns = trajectory.turns_used,
            tool_calls = trajectory.tool_calls.len(),
            duration_ms = trajectory.duration_ms,
            "Task finished"
        );
        Ok(trajectory)
    }

    /// Record the assistant turn and pick the next state from its tool calls.
    fn accept_response(
        &self,
        trajectory: &mut Trajectory,
        response: ModelResponse,
        seen_call_ids: &mut HashSet<String>,
    ) -> EngineState {
        if let Some(usage) = response.usage {
            trajectory.usage.add(usage);
        }

        let mut message = response.message;
        message.tool_calls = assign_call_ids(std::mem::take(&mut message.tool_calls), seen_call_ids);

        if message.has_tool_calls() {
            let calls = message.tool_calls.clone();
            debug!(
                task_id = %trajectory.task_id,
                turn = trajectory.turns_used,
                calls = calls.len(),
                "Model requested tool calls"
            );
            trajectory.push_message(message);
            EngineState::AwaitingTools(calls)
        } else {
            let answer = message.content.clone();
            trajectory.push_message(message);
            EngineState::Terminated(Termination::Completed(answer))
        }
    }

    /// Invoke every requested call in order; each one gets a tool message.
    async fn run_tools(
        &self,
        trajectory: &mut Trajectory,
        calls: Vec<ToolCallRequest>,
        cancel: &CancellationSignal,
    ) -> Result<EngineState, EngineError> {
        let mut lost_connection = None;

        for call in calls {
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                result = self.execute(&call) => result,
            };

            if result.error == Some(ToolErrorKind::ConnectionLost) && lost_connection.is_none() {
                lost_connection = Some(EngineError::ConnectionLost {
                    server: result.server.clone().unwrap_or_default(),
                    tool: result.tool_name.clone(),
                });
            }
            trajectory.push_tool_result(result);
        }

        match lost_connection {
            Some(err) if self.options.abort_on_connection_lost => {
                Ok(EngineState::Terminated(Termination::Fatal(err)))
            }
            _ => Ok(EngineState::AwaitingModel),
        }
    }

    async fn execute(&self, call: &ToolCallRequest) -> ToolResult {
        let started = Instant::now();
        let server = self.router.owner(&call.name).map(String::from);

        let outcome = match normalize_arguments(&call.name, &call.arguments) {
            Ok(arguments) => {
                self.router
                    .invoke(&call.name, arguments, self.options.tool_timeout)
                    .await
            }
            Err(err) => Err(err),
        };
        let duration_ms = started.elapsed().as_millis().try_into().unwrap_or(u64::MAX);

        match outcome {
            Ok(content) => {
                debug!(tool = %call.name, server = server.as_deref(), duration_ms, "Tool call succeeded");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    server,
                    success: true,
                    content,
                    error: None,
                    duration_ms,
                }
            }
            Err(err) => {
                warn!(tool = %call.name, server = server.as_deref(), kind = %err.kind(), %err, "Tool call failed");
                ToolResult {
                    tool_call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    server,
                    success: false,
                    content: err.to_string(),
                    error: Some(err.kind()),
                    duration_ms,
                }
            }
        }
    }

    /// Ask the model for the next turn, retrying transient provider errors.
    async fn request_turn(
        &self,
        trajectory: &Trajectory,
        cancel: &CancellationSignal,
    ) -> Result<ModelResponse, EngineError> {
        let policy = &self.options.retry;
        let mut attempt = 0;

        loop {
            attempt += 1;
            let request = ModelRequest {
                provider: self.options.provider.clone(),
                model: self.options.model.clone(),
                messages: trajectory.conversation.clone(),
                tools: self.router.descriptors().to_vec(),
                temperature: self.options.temperature,
            };

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                outcome = self.provider.chat(request) => outcome,
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < policy.max_attempts => {
                    let delay = policy.backoff(attempt);
                    warn!(
                        task_id = %trajectory.task_id,
                        attempt,
                        max_attempts = policy.max_attempts,
                        ?delay,
                        %err,
                        "Model provider call failed; retrying"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(source) => {
                    return Err(EngineError::Provider {
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}

/// Give empty or repeated call ids a fresh `call_<uuid>` so every result pairs with one request.
fn assign_call_ids(
    calls: Vec<ToolCallRequest>,
    seen: &mut HashSet<String>,
) -> Vec<ToolCallRequest> {
    calls
        .into_iter()
        .map(|mut call| {
            if call.id.trim().is_empty() || !seen.insert(call.id.clone()) {
                let fresh = format!("call_{}", Uuid::new_v4().simple());
                debug!(original = %call.id, replacement = %fresh, "Reassigned tool call id");
                seen.insert(fresh.clone());
                call.id = fresh;
            }
            call
        })
        .collect()
}
