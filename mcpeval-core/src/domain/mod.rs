pub mod task;
pub mod trajectory;
pub mod types;

pub use task::Task;
pub use trajectory::{Trajectory, TrajectoryStatus};
pub use types::{
    ChatMessage, MessageRole, TokenUsage, ToolCallRequest, ToolDescriptor, ToolErrorKind,
    ToolResult,
};
