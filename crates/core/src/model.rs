//! Model trait: the abstraction over language model backends.
//!
//! A Model takes the conversation so far plus a system prompt and either
//! answers in text or asks for a tool to be run.
//!
//! Implementations: Ollama, OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;
use crate::tool::ToolSchema;

/// Who authored a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One entry of the history sent to a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub content: String,
}

impl ChatTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
}

/// A tool the model asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// What the model decided to do this round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum ModelReply {
    Text(String),
    ToolCall(ToolInvocation),
}

impl ModelReply {
    pub fn tool_call(tool: impl Into<String>, args: serde_json::Value) -> Self {
        Self::ToolCall(ToolInvocation {
            tool: tool.into(),
            args,
        })
    }
}

/// The core Model trait.
///
/// The orchestrator calls `generate_with_tools()` each round without knowing
/// which backend is behind it.
#[async_trait]
pub trait Model: Send + Sync {
    /// Backend name for logs (e.g., "ollama", "openai").
    fn name(&self) -> &str;

    /// Plain completion.
    async fn generate(
        &self,
        history: &[ChatTurn],
        system_prompt: Option<&str>,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, ModelError>;

    /// Completion that may come back as a tool call.
    async fn generate_with_tools(
        &self,
        history: &[ChatTurn],
        tools: &[ToolSchema],
        system_prompt: Option<&str>,
        temperature: f32,
    ) -> Result<ModelReply, ModelError>;

    /// Health check: can we reach the backend?
    async fn health_check(&self) -> Result<bool, ModelError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn reply_wire_shape() {
        let call = ModelReply::tool_call("get_status", json!({}));
        assert_eq!(
            serde_json::to_value(&call).unwrap(),
            json!({"type": "tool_call", "content": {"tool": "get_status", "args": {}}})
        );

        let text: ModelReply =
            serde_json::from_value(json!({"type": "text", "content": "All green"})).unwrap();
        assert_eq!(text, ModelReply::Text("All green".into()));
    }

    #[test]
    fn turn_roles_serialize_lowercase() {
        let turn = ChatTurn::assistant("hi");
        assert_eq!(serde_json::to_value(&turn).unwrap()["role"], "assistant");
        assert_eq!(ChatRole::User.as_str(), "user");
    }
}
