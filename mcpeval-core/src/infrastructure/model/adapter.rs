//! Message adapters - convert between different API formats

use crate::domain::{ChatMessage, MessageRole, ToolCallRequest, ToolDescriptor};
use serde_json::{Value, json};

/// Adapter for converting messages and tool lists to provider formats
pub struct MessageAdapter;

impl MessageAdapter {
    /// Convert messages to OpenAI chat-completions format
    ///
    /// Assistant tool calls carry their arguments as a JSON string and tool
    /// results are correlated through `tool_call_id`.
    pub fn to_openai_format(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                MessageRole::Assistant if msg.has_tool_calls() => {
                    let calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": call.arguments.to_string(),
                                }
                            })
                        })
                        .collect();
                    let content = if msg.content.is_empty() {
                        Value::Null
                    } else {
                        Value::String(msg.content.clone())
                    };
                    json!({ "role": "assistant", "content": content, "tool_calls": calls })
                }
                MessageRole::Tool => json!({
                    "role": "tool",
                    "tool_call_id": msg.tool_call_id.clone().unwrap_or_default(),
                    "content": msg.content.clone(),
                }),
                _ => json!({
                    "role": msg.role.as_str(),
                    "content": msg.content.clone()
                }),
            })
            .collect()
    }

    /// Convert messages to Ollama format
    ///
    /// Same shape as OpenAI, except tool call arguments stay JSON objects.
    pub fn to_ollama_format(messages: &[ChatMessage]) -> Vec<Value> {
        messages
            .iter()
            .map(|msg| match msg.role {
                MessageRole::Assistant if msg.has_tool_calls() => {
                    let calls: Vec<Value> = msg
                        .tool_calls
                        .iter()
                        .map(|call| json!({ "function": { "name": call.name, "arguments": call.arguments } }))
                        .collect();
                    json!({ "role": "assistant", "content": msg.content.clone(), "tool_calls": calls })
                }
                _ => json!({
                    "role": msg.role.as_str(),
                    "content": msg.content.clone()
                }),
            })
            .collect()
    }

    /// Function-tool definitions understood by both OpenAI and Ollama
    pub fn to_function_tools(tools: &[ToolDescriptor]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.input_schema,
                    }
                })
            })
            .collect()
    }

    /// Build a tool call from a provider's `function` object.
    ///
    /// String arguments are decoded when they hold JSON; anything else is kept
    /// verbatim so the engine can reject it as invalid arguments.
    pub fn parse_tool_call(id: Option<String>, name: String, arguments: Value) -> ToolCallRequest {
        let arguments = match arguments {
            Value::String(raw) => serde_json::from_str(&raw).unwrap_or(Value::String(raw)),
            other => other,
        };
        ToolCallRequest::new(id.unwrap_or_default(), name, arguments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ToolErrorKind, ToolResult};

    fn conversation() -> Vec<ChatMessage> {
        let call = ToolCallRequest::new("call_1", "get_weather", json!({"city": "Paris"}));
        vec![
            ChatMessage::system("Be brief."),
            ChatMessage::user("Weather in Paris?"),
            ChatMessage::assistant("", vec![call]),
            ChatMessage::tool(&ToolResult {
                tool_call_id: "call_1".into(),
                tool_name: "get_weather".into(),
                server: Some("weather".into()),
                success: false,
                content: "timed out".into(),
                error: Some(ToolErrorKind::Timeout),
                duration_ms: 3,
            }),
        ]
    }

    #[test]
    fn openai_format_encodes_tool_calls_and_results() {
        let messages = MessageAdapter::to_openai_format(&conversation());
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["content"], Value::Null);
        assert_eq!(messages[2]["tool_calls"][0]["function"]["name"], "get_weather");
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"],
            "{\"city\":\"Paris\"}"
        );
        assert_eq!(messages[3]["role"], "tool");
        assert_eq!(messages[3]["tool_call_id"], "call_1");
    }

    #[test]
    fn ollama_format_keeps_object_arguments() {
        let messages = MessageAdapter::to_ollama_format(&conversation());
        assert_eq!(
            messages[2]["tool_calls"][0]["function"]["arguments"]["city"],
            "Paris"
        );
        assert_eq!(messages[3]["role"], "tool");
    }

    #[test]
    fn string_arguments_are_decoded_when_possible() {
        let call = MessageAdapter::parse_tool_call(
            Some("c1".into()),
            "echo".into(),
            json!("{\"text\":\"hi\"}"),
        );
        assert_eq!(call.arguments, json!({"text": "hi"}));

        let broken = MessageAdapter::parse_tool_call(None, "echo".into(), json!("{oops"));
        assert_eq!(broken.arguments, json!("{oops"));
        assert!(broken.id.is_empty());
    }
}
