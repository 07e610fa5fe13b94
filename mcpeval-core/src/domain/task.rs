use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One benchmark task, read-only input to the conversation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    #[serde(alias = "task_id")]
    pub id: String,
    #[serde(alias = "task_description")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    /// Expected tool calls, kept opaque for the downstream scorer.
    #[serde(
        default,
        alias = "expected_tool_calls",
        skip_serializing_if = "Option::is_none"
    )]
    pub tool_calls: Option<Vec<Value>>,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            goal: None,
            tool_calls: None,
        }
    }

    pub fn with_goal(mut self, goal: impl Into<String>) -> Self {
        self.goal = Some(goal.into());
        self
    }

    /// Text of the first user message for this task.
    pub fn prompt(&self) -> String {
        match self.goal.as_deref().map(str::trim) {
            Some(goal) if !goal.is_empty() => {
                format!("{}\n\nGoal: {goal}", self.description.trim())
            }
            _ => self.description.trim().to_string(),
        }
    }
}
