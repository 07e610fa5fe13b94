//! # Conversation Engine
//!
//! Runs one task as an explicit state machine:
//!
//! 1. `AwaitingModel` - send the conversation and merged tool list to the model
//!    (transient provider errors are retried with bounded backoff)
//! 2. `AwaitingTools` - invoke each requested call in order through the
//!    [`ToolRouter`](crate::application::tooling::ToolRouter); failures become
//!    tool messages for the model to react to
//! 3. `Terminated` - completed, turn budget exhausted, or fatal error
//!
//! Every model call that returns counts as one turn.

mod conversation;
mod errors;
mod options;

pub use conversation::ConversationEngine;
pub use errors::EngineError;
pub use options::{EngineOptions, RetryPolicy};
