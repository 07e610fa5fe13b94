use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::task::Task;
use super::types::{ChatMessage, TokenUsage, ToolCallRequest, ToolResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrajectoryStatus {
    Completed,
    /// The turn budget ran out before the model produced a final answer.
    #[serde(rename = "incomplete", alias = "max_turns_exceeded")]
    MaxTurnsExceeded,
    Error,
}

impl TrajectoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TrajectoryStatus::Completed => "completed",
            TrajectoryStatus::MaxTurnsExceeded => "incomplete",
            TrajectoryStatus::Error => "error",
        }
    }
}

/// Full record of one task execution; one ledger line each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub task_id: String,
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    pub conversation: Vec<ChatMessage>,
    pub tool_calls: Vec<ToolCallRequest>,
    pub tool_call_results: Vec<ToolResult>,
    #[serde(default)]
    pub final_response: Option<String>,
    pub status: TrajectoryStatus,
    pub turns_used: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub usage: TokenUsage,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: u64,
}

impl Trajectory {
    pub fn begin(task: &Task, provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            task_id: task.id.clone(),
            provider: provider.into(),
            model: model.into(),
            conversation: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_results: Vec::new(),
            final_response: None,
            status: TrajectoryStatus::Error,
            turns_used: 0,
            error: None,
            usage: TokenUsage::default(),
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: 0,
        }
    }

    /// Error record for a task whose run never produced a trajectory of its own.
    pub fn failed(task: &Task, provider: &str, model: &str, message: impl Into<String>) -> Self {
        let mut trajectory = Self::begin(task, provider, model);
        trajectory.conversation.push(ChatMessage::user(task.prompt()));
        trajectory.finish(TrajectoryStatus::Error, Some(message.into()));
        trajectory
    }

    pub(crate) fn push_message(&mut self, message: ChatMessage) {
        if message.has_tool_calls() {
            self.tool_calls.extend(message.tool_calls.iter().cloned());
        }
        self.conversation.push(message);
    }

    pub(crate) fn push_tool_result(&mut self, result: ToolResult) {
        self.conversation.push(ChatMessage::tool(&result));
        self.tool_call_results.push(result);
    }

    pub(crate) fn finish(&mut self, status: TrajectoryStatus, error: Option<String>) {
        let finished = Utc::now();
        self.status = status;
        self.error = error;
        self.duration_ms = (finished - self.started_at)
            .num_milliseconds()
            .try_into()
            .unwrap_or_default();
        self.finished_at = Some(finished);
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.status == TrajectoryStatus::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ToolErrorKind;
    use serde_json::json;

    #[test]
    fn push_message_collects_tool_calls() {
        let task = Task::new("t", "d");
        let mut trajectory = Trajectory::begin(&task, "p", "m");
        trajectory.push_message(ChatMessage::assistant(
            "",
            vec![ToolCallRequest::new("c1", "echo", json!({}))],
        ));
        trajectory.push_tool_result(ToolResult {
            tool_call_id: "c1".into(),
            tool_name: "echo".into(),
            server: None,
            success: false,
            content: "boom".into(),
            error: Some(ToolErrorKind::RemoteFailure),
            duration_ms: 0,
        });
        assert_eq!(trajectory.tool_calls.len(), 1);
        assert_eq!(trajectory.tool_call_results.len(), 1);
        assert_eq!(trajectory.conversation.len(), 2);
    }

    #[test]
    fn max_turns_status_reads_legacy_spelling() {
        let status: TrajectoryStatus = serde_json::from_str("\"max_turns_exceeded\"").unwrap();
        assert_eq!(status, TrajectoryStatus::MaxTurnsExceeded);
        assert_eq!(
            serde_json::to_string(&TrajectoryStatus::MaxTurnsExceeded).unwrap(),
            "\"incomplete\""
        );
    }

    #[test]
    fn failed_trajectory_is_finished_with_error() {
        let trajectory = Trajectory::failed(&Task::new("t", "d"), "p", "m", "panicked");
        assert!(trajectory.is_finished());
        assert_eq!(trajectory.status, TrajectoryStatus::Error);
        assert_eq!(trajectory.error.as_deref(), Some("panicked"));
    }
}
